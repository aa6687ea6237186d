//! # Keycloak Kerberos CLI
//!
//! Command-line tools for Kerberos federation providers.

#![forbid(unsafe_code)]

use clap::Parser;
use kc_cli::{
    cli::{Cli, Command},
    commands::{run_keytab, run_providers, run_resolve, run_ticket},
    config::CliConfig,
    output::error,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match CliConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error(&format!("Failed to load configuration: {e}"));
            std::process::exit(1);
        }
    };

    if cli.verbose {
        config.engine.logging.level = "debug".to_string();
    }
    if let Err(e) = kc_core::telemetry::init(&config.engine.logging) {
        error(&format!("Failed to initialize logging: {e}"));
        std::process::exit(1);
    }

    let result = match cli.command {
        Command::Providers(cmd) => run_providers(cmd, &config, cli.output),
        Command::Keytab(cmd) => run_keytab(cmd, cli.output),
        Command::Ticket(cmd) => run_ticket(cmd, &config, cli.output).await,
        Command::Resolve(args) => run_resolve(args, &config, cli.output).await,
    };

    if let Err(e) = result {
        error(&e.to_string());
        std::process::exit(1);
    }
}
