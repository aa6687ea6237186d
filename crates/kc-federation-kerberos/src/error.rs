//! Kerberos error types.
//!
//! ## NIST 800-53 Rev5: IA-6 (Authentication Feedback)
//!
//! Validation errors carry diagnostic detail for logs only. Callers must
//! never forward them to the client.

use thiserror::Error;

/// Why a ticket was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No usable key, the ticket is for another service, or the seal does not open.
    #[error("cryptographic validation failed: {0}")]
    Cryptographic(String),

    /// The ticket lifetime does not cover the current time, within clock skew.
    #[error("ticket is outside its validity window")]
    Expired,

    /// Token framing or encoding is invalid.
    #[error("malformed token: {0}")]
    MalformedToken(String),
}

impl ValidationError {
    /// Creates a cryptographic failure.
    #[must_use]
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Cryptographic(msg.into())
    }

    /// Creates a malformed token failure.
    #[must_use]
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedToken(msg.into())
    }

    /// Short, stable label for logs and diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Cryptographic(_) => "cryptographic",
            Self::Expired => "expired",
            Self::MalformedToken(_) => "malformed_token",
        }
    }
}

/// Outcome of a failed acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcceptError {
    /// The ticket itself was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The provider cannot validate anything (keytab unreadable or invalid).
    #[error("service credential unusable: {0}")]
    Configuration(String),
}

impl AcceptError {
    /// Creates a configuration fault.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Checks if this is a configuration fault.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Errors from keytab handling, principal parsing and ticket issuing.
#[derive(Debug, Error)]
pub enum KerberosError {
    /// Keytab structure is invalid.
    #[error("invalid keytab: {0}")]
    Keytab(String),

    /// Principal name cannot be parsed.
    #[error("invalid principal name: {0}")]
    Principal(String),

    /// No key for the requested principal.
    #[error("no key for principal {0}")]
    KeyNotFound(String),

    /// Encryption failed.
    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    /// Serialization failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KerberosError {
    /// Creates a keytab error.
    #[must_use]
    pub fn keytab(msg: impl Into<String>) -> Self {
        Self::Keytab(msg.into())
    }

    /// Creates a principal error.
    #[must_use]
    pub fn principal(msg: impl Into<String>) -> Self {
        Self::Principal(msg.into())
    }
}

/// Result type for keytab and issuing operations.
pub type KerberosResult<T> = Result<T, KerberosError>;
