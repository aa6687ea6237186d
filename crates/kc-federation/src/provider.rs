//! Federated user storage providers.
//!
//! ## NIST 800-53 Rev5 Controls
//!
//! - IA-2: Identification and Authentication (Organizational Users)
//! - IA-5: Authenticator Management
//!
//! A [`FederatedProvider`] bundles a provider's immutable configuration, its
//! ticket validator and its directory. Providers are shared behind `Arc` in
//! registry snapshots; nothing in them changes after construction.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kc_federation_kerberos::{KerberosTicketValidator, TicketValidator};
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::LookupError;

// ============================================================================
// Directory
// ============================================================================

/// Password state exposed by a directory.
///
/// Most directories expose neither value; both are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryCredential {
    /// Cleartext password, when the directory exposes it.
    pub password: Option<String>,
    /// Last password change (`pwdChangedTime`).
    pub password_changed_at: Option<DateTime<Utc>>,
}

/// A user record read from a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished name.
    pub dn: String,
    /// Stable directory id (e.g. `entryUUID`).
    pub id: Option<String>,
    /// Username as stored in the directory.
    pub username: String,
    /// Email address.
    pub email: Option<String>,
    /// Given name.
    pub first_name: Option<String>,
    /// Surname.
    pub last_name: Option<String>,
    /// Group names the user belongs to.
    pub groups: Vec<String>,
    /// Password state, if exposed.
    pub credential: Option<DirectoryCredential>,
    /// Other attributes.
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// Creates an entry with a DN and username.
    #[must_use]
    pub fn new(dn: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    /// Sets the directory id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets first and last name.
    #[must_use]
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    /// Adds a group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Sets the credential state.
    #[must_use]
    pub fn with_credential(mut self, credential: DirectoryCredential) -> Self {
        self.credential = Some(credential);
        self
    }
}

/// Looks up users in a provider's directory.
///
/// Implementations must be cancel-safe: the dispatcher drops the future
/// when the provider's lookup timeout elapses.
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    /// Looks up a user by local name (principal without realm).
    ///
    /// ## Errors
    ///
    /// Returns [`LookupError::NotFound`] if no entry exists and
    /// [`LookupError::Connection`] if the directory cannot be queried.
    async fn lookup(&self, username: &str) -> Result<DirectoryEntry, LookupError>;
}

// ============================================================================
// Provider
// ============================================================================

/// A registered user storage provider.
#[derive(Clone)]
pub struct FederatedProvider {
    config: Arc<ProviderConfig>,
    seq: u64,
    validator: Option<Arc<dyn TicketValidator>>,
    directory: Arc<dyn DirectoryLookup>,
}

impl FederatedProvider {
    /// Creates a provider. A validator is built from the Kerberos settings
    /// when the configuration has them.
    #[must_use]
    pub fn new(config: ProviderConfig, directory: Arc<dyn DirectoryLookup>) -> Self {
        let validator = config.kerberos.as_ref().map(|k| {
            Arc::new(
                KerberosTicketValidator::new(k.credential.clone()).with_clock_skew(k.clock_skew),
            ) as Arc<dyn TicketValidator>
        });

        Self {
            config: Arc::new(config),
            seq: 0,
            validator,
            directory,
        }
    }

    /// Replaces the ticket validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn TicketValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Sets the registration sequence. Used by the registry.
    #[must_use]
    pub(crate) const fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Returns the provider name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the priority.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.config.priority
    }

    /// Returns the registration sequence (tie-breaker for equal priorities).
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// Returns the ticket validator, if Kerberos is enabled.
    #[must_use]
    pub fn validator(&self) -> Option<&Arc<dyn TicketValidator>> {
        self.validator.as_ref()
    }

    /// Returns the directory.
    #[must_use]
    pub fn directory(&self) -> &Arc<dyn DirectoryLookup> {
        &self.directory
    }

    /// Returns true if the dispatcher should consult this provider.
    #[must_use]
    pub fn accepts_tickets(&self) -> bool {
        self.config.accepts_tickets() && self.validator.is_some()
    }
}

impl fmt::Debug for FederatedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederatedProvider")
            .field("name", &self.config.name)
            .field("priority", &self.config.priority)
            .field("seq", &self.seq)
            .field("realm_policy", &self.config.realm_policy().to_string())
            .finish_non_exhaustive()
    }
}
