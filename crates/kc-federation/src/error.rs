//! Federation error types.
//!
//! ## NIST 800-53 Rev5: AU-2 (Event Logging)
//!
//! Error types carry structured context for audit logging. Only
//! [`AuthFailure::public_message`] may reach the client.

use kc_federation_kerberos::KerberosError;
use kc_storage::StorageError;
use thiserror::Error;

use crate::attempt::ResolutionAttempt;
use crate::policy::PolicyViolation;

/// Errors from provider configuration and administration.
#[derive(Debug, Error)]
pub enum FederationError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A provider with this name is already registered.
    #[error("Provider already registered: {0}")]
    DuplicateProvider(String),

    /// No provider with this name is registered.
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// No factory for this provider type.
    #[error("Unknown provider type: {0}")]
    UnknownProviderType(String),

    /// Kerberos setup error.
    #[error("Kerberos error: {0}")]
    Kerberos(#[from] KerberosError),

    /// Storage error when persisting federated users.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Internal error.
    #[error("Internal federation error: {0}")]
    Internal(String),
}

impl FederationError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Checks if this is a configuration error.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::UnknownProviderType(_))
    }

    /// Checks if this is a registry conflict.
    #[must_use]
    pub const fn is_registry_error(&self) -> bool {
        matches!(self, Self::DuplicateProvider(_) | Self::ProviderNotFound(_))
    }
}

/// Result type for federation operations.
pub type FederationResult<T> = Result<T, FederationError>;

/// Why a directory lookup produced no entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// No entry for the principal.
    #[error("no directory entry")]
    NotFound,

    /// The directory could not be reached or answered with an error.
    #[error("directory connection error: {0}")]
    Connection(String),

    /// The lookup did not complete within the provider's timeout.
    #[error("directory lookup timed out")]
    Timeout,
}

impl LookupError {
    /// Creates a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Short, stable label for logs and diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Connection(_) => "connection_error",
            Self::Timeout => "timeout",
        }
    }
}

/// Why an accepted identity could not be materialized.
#[derive(Debug, Error)]
pub enum MaterializeError {
    /// The directory credential violates the local password policy.
    #[error("password policy violated: {}", join(.0))]
    PasswordPolicy(Vec<PolicyViolation>),

    /// A local user with this username exists but belongs elsewhere.
    #[error("user '{username}' is linked to {}", .linked_to.as_deref().unwrap_or("no provider"))]
    LinkedElsewhere {
        /// Local username.
        username: String,
        /// Provider the user is linked to, `None` for local-only users.
        linked_to: Option<String>,
    },

    /// The directory entry cannot be turned into a user.
    #[error("invalid directory entry: {0}")]
    InvalidEntry(String),

    /// No local user with this username.
    #[error("no local user '{0}'")]
    UserNotFound(String),

    /// The store rejected the write.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

fn join(violations: &[PolicyViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Terminal failure of a resolution.
///
/// ## NIST 800-53 Rev5: IA-6 (Authentication Feedback)
///
/// The variants keep full diagnostics for logs and audit, but the outward
/// message never reveals which providers or realms exist.
#[derive(Debug, Error)]
pub enum AuthFailure {
    /// No provider accepted the ticket.
    #[error("all providers exhausted after {} attempts", .attempts.len())]
    AllProvidersExhausted {
        /// One entry per consulted provider, in dispatch order.
        attempts: Vec<ResolutionAttempt>,
    },

    /// The accepting provider enforces the password policy and it failed.
    #[error("password policy violated for provider {provider}")]
    PasswordPolicyViolation {
        /// Accepting provider.
        provider: String,
        /// Failed rules.
        violations: Vec<PolicyViolation>,
    },

    /// The local user is linked to another provider.
    #[error("user '{username}' is linked to another provider than {provider}")]
    IdentityConflict {
        /// Accepting provider.
        provider: String,
        /// Local username.
        username: String,
        /// Provider the user is linked to.
        linked_to: Option<String>,
    },

    /// Writing the local user failed.
    #[error("identity materialization failed for provider {provider}: {reason}")]
    Materialization {
        /// Accepting provider.
        provider: String,
        /// Diagnostic detail.
        reason: String,
    },
}

impl AuthFailure {
    /// Message safe to show to the client.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::PasswordPolicyViolation { .. } => "password policy not met",
            _ => "authentication failed",
        }
    }

    /// `WWW-Authenticate` value asking the client to negotiate again.
    #[must_use]
    pub const fn challenge(&self) -> &'static str {
        kc_federation_kerberos::NegotiateHeader::SCHEME
    }

    /// The per-provider attempts, when dispatch was exhausted.
    #[must_use]
    pub fn attempts(&self) -> &[ResolutionAttempt] {
        match self {
            Self::AllProvidersExhausted { attempts } => attempts,
            _ => &[],
        }
    }

    /// Maps to the generic core error.
    #[must_use]
    pub fn to_core_error(&self) -> kc_core::Error {
        match self {
            Self::PasswordPolicyViolation { .. } => kc_core::Error::PasswordPolicy,
            Self::Materialization { .. } => kc_core::Error::Internal,
            _ => kc_core::Error::Authentication,
        }
    }
}
