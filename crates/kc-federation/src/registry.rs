//! Provider registry.
//!
//! Holds the registered providers of one realm as an immutable, ordered
//! snapshot. Readers load the snapshot without locking; writers are
//! serialized and publish a fully built replacement, so a dispatch in
//! flight keeps working against the snapshot it started with.
//!
//! Order is ascending priority, then registration sequence.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{FederationError, FederationResult};
use crate::provider::FederatedProvider;

/// Ordered, immutable provider list.
pub type ProviderSnapshot = Arc<Vec<Arc<FederatedProvider>>>;

/// Registry of federated providers.
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: ArcSwap<Vec<Arc<FederatedProvider>>>,
    next_seq: Mutex<u64>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: ArcSwap::from_pointee(Vec::new()),
            next_seq: Mutex::new(0),
        }
    }

    /// Registers a provider.
    ///
    /// ## Errors
    ///
    /// Returns `DuplicateProvider` if the name is taken.
    pub fn register(&self, provider: FederatedProvider) -> FederationResult<()> {
        let mut next_seq = self.next_seq.lock();
        let current = self.providers.load_full();

        if current.iter().any(|p| p.name() == provider.name()) {
            return Err(FederationError::DuplicateProvider(provider.name().to_string()));
        }

        let provider = provider.with_seq(*next_seq);
        *next_seq += 1;
        debug!(
            provider = provider.name(),
            priority = provider.priority(),
            seq = provider.seq(),
            "Provider registered"
        );

        let mut next: Vec<_> = current.iter().cloned().collect();
        next.push(Arc::new(provider));
        self.publish(next);
        Ok(())
    }

    /// Replaces a registered provider, keeping its registration sequence.
    ///
    /// ## Errors
    ///
    /// Returns `ProviderNotFound` if no provider has this name.
    pub fn replace(&self, provider: FederatedProvider) -> FederationResult<()> {
        let _writer = self.next_seq.lock();
        let current = self.providers.load_full();

        let existing = current
            .iter()
            .find(|p| p.name() == provider.name())
            .ok_or_else(|| FederationError::ProviderNotFound(provider.name().to_string()))?;
        let provider = Arc::new(provider.with_seq(existing.seq()));
        debug!(
            provider = provider.name(),
            priority = provider.priority(),
            seq = provider.seq(),
            "Provider replaced"
        );

        let next = current
            .iter()
            .map(|p| {
                if p.name() == provider.name() {
                    Arc::clone(&provider)
                } else {
                    Arc::clone(p)
                }
            })
            .collect();
        self.publish(next);
        Ok(())
    }

    /// Removes a provider and returns it.
    ///
    /// ## Errors
    ///
    /// Returns `ProviderNotFound` if no provider has this name.
    pub fn remove(&self, name: &str) -> FederationResult<Arc<FederatedProvider>> {
        let _writer = self.next_seq.lock();
        let current = self.providers.load_full();

        let removed = current
            .iter()
            .find(|p| p.name() == name)
            .cloned()
            .ok_or_else(|| FederationError::ProviderNotFound(name.to_string()))?;

        let next = current
            .iter()
            .filter(|p| p.name() != name)
            .cloned()
            .collect();
        self.publish(next);
        debug!(provider = name, "Provider removed");
        Ok(removed)
    }

    /// Gets a provider by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<FederatedProvider>> {
        self.providers
            .load()
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    /// Returns all registered providers in dispatch order.
    #[must_use]
    pub fn list(&self) -> ProviderSnapshot {
        self.providers.load_full()
    }

    /// Returns the providers the dispatcher consults, in dispatch order.
    #[must_use]
    pub fn enabled_snapshot(&self) -> Vec<Arc<FederatedProvider>> {
        self.providers
            .load()
            .iter()
            .filter(|p| p.accepts_tickets())
            .cloned()
            .collect()
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.load().len()
    }

    /// Returns true if no provider is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.load().is_empty()
    }

    fn publish(&self, mut providers: Vec<Arc<FederatedProvider>>) {
        providers.sort_by_key(|p| (p.priority(), p.seq()));
        self.providers.store(Arc::new(providers));
    }
}
