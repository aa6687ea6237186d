//! Per-provider resolution attempts.
//!
//! Every provider consulted for a ticket leaves one [`ResolutionAttempt`].
//! Attempts are diagnostics: they are logged and returned to operators,
//! never to the client, and never persisted.

use std::fmt;

use kc_federation_kerberos::{PrincipalName, ValidationError};

use crate::error::LookupError;

/// What happened when one provider was consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The provider validated the ticket and found the directory entry.
    Accepted {
        /// Authenticated client principal.
        principal: PrincipalName,
        /// DN of the directory entry.
        dn: String,
    },

    /// The realm did not satisfy the provider's expected realm.
    RealmMismatch {
        /// Expected realm of the provider.
        expected: String,
        /// Realm of the ticket or principal.
        actual: String,
    },

    /// The validator rejected the ticket.
    ValidationFailed(ValidationError),

    /// The provider cannot validate at all (keytab missing or corrupt).
    ConfigurationFault(String),

    /// The ticket was valid but the directory lookup failed.
    DirectoryLookupFailed(LookupError),
}

impl AttemptOutcome {
    /// Short, stable label for logs and diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::RealmMismatch { .. } => "realm_mismatch",
            Self::ValidationFailed(e) => e.kind(),
            Self::ConfigurationFault(_) => "configuration_fault",
            Self::DirectoryLookupFailed(e) => e.kind(),
        }
    }

    /// Returns true if the provider accepted the ticket.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted { principal, dn } => write!(f, "accepted {principal} ({dn})"),
            Self::RealmMismatch { expected, actual } => {
                write!(f, "realm mismatch: expected {expected}, got {actual}")
            }
            Self::ValidationFailed(e) => write!(f, "validation failed: {e}"),
            Self::ConfigurationFault(reason) => write!(f, "configuration fault: {reason}"),
            Self::DirectoryLookupFailed(e) => write!(f, "directory lookup failed: {e}"),
        }
    }
}

/// One (ticket, provider) evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionAttempt {
    /// Provider name.
    pub provider: String,
    /// Provider priority at the time of the attempt.
    pub priority: i32,
    /// Outcome.
    pub outcome: AttemptOutcome,
}

impl ResolutionAttempt {
    /// Creates an attempt record.
    #[must_use]
    pub fn new(provider: impl Into<String>, priority: i32, outcome: AttemptOutcome) -> Self {
        Self {
            provider: provider.into(),
            priority,
            outcome,
        }
    }
}

impl fmt::Display for ResolutionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.priority, self.provider, self.outcome)
    }
}
