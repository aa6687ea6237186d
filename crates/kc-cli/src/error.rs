//! CLI error types.

use kc_federation::FederationError;
use kc_federation_kerberos::{AcceptError, KerberosError, ValidationError};
use thiserror::Error;

/// CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Engine configuration error.
    #[error(transparent)]
    Engine(#[from] kc_core::Error),

    /// Provider setup error.
    #[error(transparent)]
    Federation(#[from] FederationError),

    /// Keytab or principal error.
    #[error("kerberos error: {0}")]
    Kerberos(#[from] KerberosError),

    /// The ticket could not be decoded or opened.
    #[error("ticket rejected: {0}")]
    Ticket(#[from] ValidationError),

    /// The keytab could not be used to open a ticket.
    #[error("keytab error: {0}")]
    Keytab(String),

    /// Resolution failed.
    #[error("resolution failed: {0}")]
    Resolution(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<AcceptError> for CliError {
    fn from(err: AcceptError) -> Self {
        match err {
            AcceptError::Validation(e) => Self::Ticket(e),
            AcceptError::Configuration(msg) => Self::Keytab(msg),
        }
    }
}

/// CLI result type.
pub type CliResult<T> = Result<T, CliError>;
