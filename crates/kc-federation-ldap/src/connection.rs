//! LDAP connection pool management.
//!
//! ## Security Requirements
//!
//! All connections use LDAPS (TLS from connection start).
//! STARTTLS is NOT supported to prevent downgrade attacks.
//!
//! Acquisition is bounded twice by the connection timeout: once waiting
//! for a pool slot and once establishing and binding a new connection.

use std::sync::Arc;

use ldap3::{Ldap, LdapConnAsync, LdapConnSettings};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::LdapConfig;
use crate::error::{LdapError, LdapResult};

/// Connection pool for LDAP connections.
///
/// At most `pool_max_size` connections are checked out at once. Healthy
/// connections go back to the idle list when their handle drops.
pub struct LdapConnectionPool {
    config: Arc<LdapConfig>,
    semaphore: Arc<Semaphore>,
    idle: Arc<Mutex<Vec<Ldap>>>,
}

impl LdapConnectionPool {
    /// Creates a new connection pool. No connection is opened until the
    /// first [`get`](Self::get).
    #[must_use]
    pub fn new(config: LdapConfig) -> Self {
        let max_size = config.pool_max_size;
        Self {
            config: Arc::new(config),
            semaphore: Arc::new(Semaphore::new(max_size)),
            idle: Arc::new(Mutex::new(Vec::with_capacity(max_size))),
        }
    }

    /// Gets a connection from the pool.
    ///
    /// ## Errors
    ///
    /// - [`LdapError::PoolExhausted`] if no slot frees up in time
    /// - [`LdapError::Timeout`] if connecting and binding takes too long
    /// - [`LdapError::Connection`] or [`LdapError::Bind`] on failure
    pub async fn get(&self) -> LdapResult<LdapConnection> {
        let permit = timeout(
            self.config.connection_timeout,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        .map_err(|_| LdapError::PoolExhausted)?
        .map_err(|_| LdapError::PoolExhausted)?;

        let reused = self.idle.lock().pop();
        let ldap = match reused {
            Some(ldap) => ldap,
            None => timeout(self.config.connection_timeout, self.create_connection())
                .await
                .map_err(|_| LdapError::Timeout)??,
        };

        Ok(LdapConnection {
            ldap,
            reusable: true,
            pool: self.idle.clone(),
            _permit: permit,
        })
    }

    /// Creates a new LDAPS connection bound as the service account.
    async fn create_connection(&self) -> LdapResult<Ldap> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.config.connection_timeout)
            .set_no_tls_verify(!self.config.validate_certificates);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.config.connection_url)
            .await
            .map_err(|e| LdapError::connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        ldap.simple_bind(&self.config.bind_dn, &self.config.bind_credential)
            .await
            .map_err(|e| LdapError::Bind(e.to_string()))?
            .success()
            .map_err(|e| LdapError::Bind(format!("result code {}", bind_result_code(&e))))?;

        debug!(url = %self.config.connection_url, "LDAP connection established");
        Ok(ldap)
    }

    /// Tests the connection to the LDAP server.
    ///
    /// ## Errors
    ///
    /// Returns an error if no connection can be made or the users DN
    /// cannot be read.
    pub async fn test_connection(&self) -> LdapResult<()> {
        let mut conn = self.get().await?;
        let users_dn = self.config.users_dn.clone();
        let result = conn
            .ldap_mut()
            .with_timeout(self.config.read_timeout)
            .search(&users_dn, ldap3::Scope::Base, "(objectClass=*)", vec!["dn"])
            .await;

        if let Err(e) = result {
            conn.discard();
            return Err(LdapError::connection(format!("Test search failed: {e}")));
        }
        Ok(())
    }

    /// Number of idle connections.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Number of slots not currently checked out.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LdapConfig {
        &self.config
    }
}

fn bind_result_code(err: &ldap3::LdapError) -> String {
    match err {
        ldap3::LdapError::LdapResult { result } => result.rc.to_string(),
        other => other.to_string(),
    }
}

/// A connection from the pool.
///
/// When dropped, the connection is returned to the pool unless it was
/// discarded.
pub struct LdapConnection {
    ldap: Ldap,
    reusable: bool,
    pool: Arc<Mutex<Vec<Ldap>>>,
    _permit: OwnedSemaphorePermit,
}

impl LdapConnection {
    /// Returns a mutable reference to the LDAP connection.
    pub fn ldap_mut(&mut self) -> &mut Ldap {
        &mut self.ldap
    }

    /// Marks the connection as broken so it is closed instead of reused.
    pub fn discard(&mut self) {
        self.reusable = false;
    }
}

impl Drop for LdapConnection {
    fn drop(&mut self) {
        if self.reusable {
            self.pool.lock().push(self.ldap.clone());
        }
    }
}
