//! LDAP directory and provider factory.
//!
//! ## Security Requirements
//!
//! - All connections use LDAPS (TLS from connection start)
//! - STARTTLS is NOT supported
//! - Plain LDAP is NOT supported
//! - Passwords are never logged

use std::sync::Arc;

use async_trait::async_trait;
use kc_federation::{
    DirectoryEntry, DirectoryLookup, FederatedProvider, FederationResult, LookupError,
    ProviderConfig, ProviderFactory,
};
use tracing::{debug, instrument};

use crate::config::LdapConfig;
use crate::connection::LdapConnectionPool;
use crate::error::{LdapError, LdapResult};
use crate::mapper::LdapEntryMapper;
use crate::search::LdapSearcher;

/// Provider type id of LDAP providers.
pub const PROVIDER_TYPE: &str = "ldap";

/// A [`DirectoryLookup`] backed by an LDAPS server.
pub struct LdapDirectory {
    pool: LdapConnectionPool,
}

impl LdapDirectory {
    /// Creates a directory. Connections are opened on first lookup.
    #[must_use]
    pub fn new(config: LdapConfig) -> Self {
        Self {
            pool: LdapConnectionPool::new(config),
        }
    }

    /// Returns the LDAP configuration.
    #[must_use]
    pub fn config(&self) -> &LdapConfig {
        self.pool.config()
    }

    /// Checks that the server is reachable with the service account.
    ///
    /// ## Errors
    ///
    /// Returns the underlying connection or bind error.
    pub async fn test_connection(&self) -> LdapResult<()> {
        self.pool.test_connection().await
    }

    async fn find(&self, username: &str) -> LdapResult<DirectoryEntry> {
        let config = self.pool.config();
        let mut conn = self.pool.get().await?;
        let mut searcher = LdapSearcher::new(&mut conn, config);

        let entry = searcher
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| LdapError::user_not_found(username))?;
        let groups = searcher.find_groups_of(&entry.dn).await?;

        LdapEntryMapper::new(config).to_directory_entry(&entry, groups)
    }
}

#[async_trait]
impl DirectoryLookup for LdapDirectory {
    #[instrument(skip(self), fields(url = %self.pool.config().connection_url))]
    async fn lookup(&self, username: &str) -> Result<DirectoryEntry, LookupError> {
        let result = self.find(username).await;
        if let Err(e) = &result {
            debug!(error = %e, "LDAP lookup failed");
        }
        result.map_err(LookupError::from)
    }
}

impl std::fmt::Debug for LdapDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirectory")
            .field("url", &self.pool.config().connection_url)
            .field("users_dn", &self.pool.config().users_dn)
            .finish_non_exhaustive()
    }
}

/// Builds LDAP-backed federation providers.
#[derive(Debug, Default, Clone, Copy)]
pub struct LdapProviderFactory;

impl ProviderFactory for LdapProviderFactory {
    fn provider_type(&self) -> &str {
        PROVIDER_TYPE
    }

    fn create(&self, config: ProviderConfig) -> FederationResult<FederatedProvider> {
        let ldap = LdapConfig::from_provider(&config)?;
        Ok(FederatedProvider::new(config, Arc::new(LdapDirectory::new(ldap))))
    }
}
