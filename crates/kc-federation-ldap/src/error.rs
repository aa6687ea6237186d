//! Errors raised while talking to the directory.
//!
//! Messages carry the server's diagnostic but never the bind credential.
//! Lookup failures are folded into [`LookupError`] before the dispatcher
//! sees them, so one provider's outage only skips that provider.

use kc_federation::{FederationError, LookupError};
use thiserror::Error;

/// Directory access error.
#[derive(Debug, Error)]
pub enum LdapError {
    /// Provider settings are missing or malformed.
    #[error("LDAP configuration error: {0}")]
    Configuration(String),

    /// The connection URL is not `ldaps://`.
    #[error("only ldaps:// connection URLs are accepted")]
    InsecureProtocol,

    /// The TCP or TLS connection could not be opened.
    #[error("LDAP connection failed: {0}")]
    Connection(String),

    /// The service account was refused.
    #[error("LDAP bind failed: {0}")]
    Bind(String),

    /// The server rejected a search.
    #[error("LDAP search failed: {0}")]
    Search(String),

    /// No entry under the users DN matches the username.
    #[error("no directory entry for '{0}'")]
    UserNotFound(String),

    /// An entry lacks an attribute the mapping requires.
    #[error("attribute mapping error: {0}")]
    AttributeMapping(String),

    /// Connect, bind or search exceeded its timeout.
    #[error("LDAP operation timed out")]
    Timeout,

    /// No pooled connection became free within the connection timeout.
    #[error("LDAP connection pool exhausted")]
    PoolExhausted,

    /// Protocol-level failure from `ldap3`.
    #[error("LDAP protocol error: {0}")]
    Ldap3(#[from] ldap3::LdapError),
}

impl LdapError {
    /// Shorthand for [`LdapError::Configuration`].
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Shorthand for [`LdapError::Connection`].
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Shorthand for [`LdapError::UserNotFound`].
    #[must_use]
    pub fn user_not_found(username: impl Into<String>) -> Self {
        Self::UserNotFound(username.into())
    }

    /// Shorthand for [`LdapError::AttributeMapping`].
    #[must_use]
    pub fn mapping(msg: impl Into<String>) -> Self {
        Self::AttributeMapping(msg.into())
    }

    /// True when the directory was unreachable or too slow, as opposed to
    /// answering with a definite result.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout | Self::PoolExhausted | Self::Ldap3(_)
        )
    }
}

/// Result type for LDAP operations.
pub type LdapResult<T> = Result<T, LdapError>;

impl From<LdapError> for FederationError {
    fn from(err: LdapError) -> Self {
        match err {
            LdapError::Configuration(msg) => Self::Configuration(msg),
            LdapError::InsecureProtocol => Self::Configuration(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<LdapError> for LookupError {
    fn from(err: LdapError) -> Self {
        match err {
            LdapError::UserNotFound(_) => Self::NotFound,
            LdapError::Timeout | LdapError::PoolExhausted => Self::Timeout,
            other => Self::Connection(other.to_string()),
        }
    }
}
