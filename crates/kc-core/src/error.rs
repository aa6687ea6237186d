//! Engine-level errors.
//!
//! ## NIST 800-53 Rev5: SI-11 (Error Handling)
//!
//! Which realms or providers exist must never be inferable from an outward
//! error. Resolution failures collapse into [`Error::Authentication`] or
//! [`Error::PasswordPolicy`] before they leave the engine; detail stays in
//! logs and audit events.

use thiserror::Error;

/// Result type alias using the core error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine-level error.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or unreadable engine configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure while reading configuration or key material.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No provider produced an identity for the ticket.
    #[error("authentication failed")]
    Authentication,

    /// The ticket was accepted but the user fails the local password policy.
    #[error("password policy not met")]
    PasswordPolicy,

    /// The identity could not be stored.
    #[error("internal error")]
    Internal,
}

impl Error {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True if an operator has to fix the deployment; these are logged at
    /// error level.
    #[must_use]
    pub const fn is_operator_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Io(_) | Self::Internal)
    }

    /// True if the client should be challenged again.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Authentication | Self::PasswordPolicy)
    }
}
