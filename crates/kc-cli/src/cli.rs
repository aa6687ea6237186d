//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::OutputFormat;

/// Keycloak Kerberos CLI - provider, keytab and ticket tooling.
#[derive(Debug, Parser)]
#[command(name = "kc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Engine configuration file (defaults to ~/.keycloak/kc.toml).
    #[arg(short, long, env = "KC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value = "table")]
    pub output: OutputFormat,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configured federation providers.
    #[command(subcommand)]
    Providers(ProvidersCommand),

    /// Keytab inspection and key generation.
    #[command(subcommand)]
    Keytab(KeytabCommand),

    /// Service ticket minting and inspection.
    #[command(subcommand)]
    Ticket(TicketCommand),

    /// Resolve a ticket against the configured providers.
    Resolve(ResolveArgs),
}

/// Provider commands.
#[derive(Debug, Subcommand)]
pub enum ProvidersCommand {
    /// List providers in dispatch order.
    List,
}

/// Keytab commands.
#[derive(Debug, Subcommand)]
pub enum KeytabCommand {
    /// List keytab entries (keys are never printed).
    List {
        /// Keytab file.
        keytab: PathBuf,
    },

    /// Add a freshly generated key, creating the keytab if needed.
    Add {
        /// Keytab file.
        keytab: PathBuf,

        /// Principal, e.g. `HTTP/localhost@KEYCLOAK.ORG`.
        principal: String,

        /// Key version number.
        #[arg(long, default_value = "1")]
        kvno: u32,

        /// Encryption type (aes128, aes256).
        #[arg(short, long, default_value = "aes256")]
        enctype: String,
    },
}

/// Ticket commands.
#[derive(Debug, Subcommand)]
pub enum TicketCommand {
    /// Mint a service ticket with a keytab key and print the Negotiate header.
    Mint {
        /// Keytab holding the service key.
        #[arg(short, long)]
        keytab: PathBuf,

        /// Service principal, e.g. `HTTP/localhost@KEYCLOAK.ORG`.
        #[arg(short, long)]
        service: String,

        /// Client principal, e.g. `user1@KEYCLOAK.ORG`.
        client: String,

        /// Ticket lifetime in seconds.
        #[arg(long, default_value = "36000")]
        lifetime: u64,

        /// Seconds to shift the validity window (negative for the past).
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        offset: i64,

        /// Cleartext realm to put in the header instead of the service realm.
        #[arg(long)]
        header_realm: Option<String>,

        /// Emit a bare Kerberos GSS token instead of SPNEGO.
        #[arg(long)]
        raw: bool,
    },

    /// Decode the cleartext parts of a ticket, optionally opening it.
    Inspect {
        /// `Negotiate <base64>` header value or bare base64 token.
        token: String,

        /// Keytab to open the ticket with.
        #[arg(short, long)]
        keytab: Option<PathBuf>,
    },
}

/// Resolve arguments.
#[derive(Debug, clap::Args)]
pub struct ResolveArgs {
    /// `Negotiate <base64>` header value or bare base64 token.
    pub token: String,

    /// Principal the client asserts, used as the realm hint.
    #[arg(long)]
    pub principal: Option<String>,
}
