//! # kc-cli
//!
//! Operator tooling for Kerberos federation.
//!
//! This crate provides command-line utilities for:
//! - Listing configured providers in dispatch order
//! - Keytab inspection and key generation
//! - Minting and inspecting service tickets
//! - Resolving a ticket with per-provider diagnostics

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::future_not_send)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::Cli;
pub use config::CliConfig;
pub use error::{CliError, CliResult};
