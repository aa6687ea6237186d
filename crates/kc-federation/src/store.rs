//! Administrative provider configuration.
//!
//! ## NIST 800-53 Rev5: CM-3 (Configuration Change Control)
//!
//! Provider registration, update and removal go through a
//! [`ConfigurationStore`]. Each change is applied completely before
//! `apply` returns and is recorded as an audit event.

use std::collections::HashMap;
use std::sync::Arc;

use kc_core::{EngineConfig, Event, EventListener, EventType, ProviderComponent};
use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::error::{FederationError, FederationResult};
use crate::provider::FederatedProvider;
use crate::registry::ProviderRegistry;

/// An administrative change to the provider set.
#[derive(Debug, Clone)]
pub enum ProviderChange {
    /// Add a new provider.
    Register(ProviderComponent),
    /// Replace an existing provider's configuration.
    Update(ProviderComponent),
    /// Remove a provider by name.
    Remove(String),
}

impl ProviderChange {
    fn name(&self) -> &str {
        match self {
            Self::Register(c) | Self::Update(c) => &c.name,
            Self::Remove(name) => name,
        }
    }
}

/// Builds providers of one type.
pub trait ProviderFactory: Send + Sync {
    /// Provider type id, matched against `ProviderComponent::provider_id`.
    fn provider_type(&self) -> &str;

    /// Builds a provider from its typed configuration.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if the provider cannot be built.
    fn create(&self, config: ProviderConfig) -> FederationResult<FederatedProvider>;
}

/// Applies administrative provider changes.
pub trait ConfigurationStore: Send + Sync {
    /// Applies a change. When this returns `Ok`, new resolutions see it.
    ///
    /// ## Errors
    ///
    /// Returns an error if the change is invalid; nothing is applied then.
    fn apply(&self, change: ProviderChange) -> FederationResult<()>;

    /// Returns the current provider components.
    fn components(&self) -> Vec<ProviderComponent>;
}

/// [`ConfigurationStore`] that feeds a [`ProviderRegistry`].
pub struct RegistryConfigurationStore {
    registry: Arc<ProviderRegistry>,
    factories: HashMap<String, Arc<dyn ProviderFactory>>,
    realm_id: Uuid,
    defaults: EngineConfig,
    events: Arc<dyn EventListener>,
    components: Mutex<Vec<ProviderComponent>>,
}

impl RegistryConfigurationStore {
    /// Creates a store for one realm.
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        realm_id: Uuid,
        defaults: EngineConfig,
        events: Arc<dyn EventListener>,
    ) -> Self {
        Self {
            registry,
            factories: HashMap::new(),
            realm_id,
            defaults,
            events,
            components: Mutex::new(Vec::new()),
        }
    }

    /// Adds a provider factory.
    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
        self
    }

    /// Returns the registry this store feeds.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Registers every provider in `config`, in file order.
    ///
    /// ## Errors
    ///
    /// Stops at the first provider that cannot be registered.
    pub fn load(&self, config: &EngineConfig) -> FederationResult<()> {
        for component in &config.providers {
            self.apply(ProviderChange::Register(component.clone()))?;
        }
        Ok(())
    }

    fn build(&self, component: &ProviderComponent) -> FederationResult<FederatedProvider> {
        let factory = self
            .factories
            .get(&component.provider_id)
            .ok_or_else(|| FederationError::UnknownProviderType(component.provider_id.clone()))?;
        let config = ProviderConfig::from_component(component, self.realm_id, &self.defaults)?;
        factory.create(config)
    }

    fn audit(&self, event_type: EventType, name: &str, priority: Option<i32>) {
        let mut event = Event::builder(event_type)
            .realm(self.realm_id)
            .provider(name);
        if let Some(priority) = priority {
            event = event.detail("priority", priority.to_string());
        }
        self.events.on_event(&event.build());
    }

    fn apply_locked(
        &self,
        components: &mut Vec<ProviderComponent>,
        change: &ProviderChange,
    ) -> FederationResult<()> {
        match change {
            ProviderChange::Register(component) => {
                self.registry.register(self.build(component)?)?;
                components.push(component.clone());
                self.audit(EventType::ProviderRegistered, &component.name, Some(component.priority));
            }
            ProviderChange::Update(component) => {
                let slot = components
                    .iter_mut()
                    .find(|c| c.name == component.name)
                    .ok_or_else(|| FederationError::ProviderNotFound(component.name.clone()))?;
                self.registry.replace(self.build(component)?)?;
                *slot = component.clone();
                self.audit(EventType::ProviderUpdated, &component.name, Some(component.priority));
            }
            ProviderChange::Remove(name) => {
                self.registry.remove(name)?;
                components.retain(|c| &c.name != name);
                self.audit(EventType::ProviderRemoved, name, None);
            }
        }
        Ok(())
    }
}

impl ConfigurationStore for RegistryConfigurationStore {
    fn apply(&self, change: ProviderChange) -> FederationResult<()> {
        let mut components = self.components.lock();
        let result = self.apply_locked(&mut components, &change);

        match &result {
            Ok(()) => info!(provider = change.name(), "Provider configuration applied"),
            Err(e) => warn!(provider = change.name(), error = %e, "Provider configuration rejected"),
        }
        result
    }

    fn components(&self) -> Vec<ProviderComponent> {
        self.components.lock().clone()
    }
}
