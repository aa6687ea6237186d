//! Identity materialization.
//!
//! ## NIST 800-53 Rev5: IA-8 (Identification and Authentication)
//!
//! Turns an accepted principal and its directory entry into the local user
//! record. The record remembers the provider it came from; a user linked to
//! one provider is never re-linked to another as a side effect of login.
//!
//! Each call computes the complete record first and writes it with a single
//! store call, so a failed or cancelled call leaves the store unchanged.

use std::sync::Arc;

use chrono::Utc;
use kc_core::{Event, EventListener, EventType};
use kc_federation_kerberos::AuthenticatedPrincipal;
use kc_model::{attributes, User};
use kc_storage::UserProvider;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::error::MaterializeError;
use crate::policy::PasswordPolicy;
use crate::provider::DirectoryEntry;

/// Result of a successful materialization.
#[derive(Debug, Clone)]
pub struct Materialized {
    /// The stored user.
    pub user: User,
    /// Whether this login created the user.
    pub created: bool,
}

/// Creates and refreshes local users from directory entries.
pub struct IdentityMaterializer {
    store: Arc<dyn UserProvider>,
    policy: PasswordPolicy,
    events: Arc<dyn EventListener>,
}

impl IdentityMaterializer {
    /// Creates a materializer over a user store.
    #[must_use]
    pub fn new(store: Arc<dyn UserProvider>, events: Arc<dyn EventListener>) -> Self {
        Self {
            store,
            policy: PasswordPolicy::none(),
            events,
        }
    }

    /// Sets the local password policy.
    #[must_use]
    pub fn with_policy(mut self, policy: PasswordPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the password policy.
    #[must_use]
    pub const fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Returns the user store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn UserProvider> {
        &self.store
    }

    /// Creates or refreshes the local user for an accepted login.
    ///
    /// ## Errors
    ///
    /// - `PasswordPolicy` if the provider enforces the policy and the
    ///   directory credential fails it; nothing is written.
    /// - `LinkedElsewhere` if the username belongs to another provider or to
    ///   a local-only account.
    /// - `InvalidEntry` if the entry has no usable username.
    /// - `Storage` if the write fails.
    pub async fn materialize(
        &self,
        principal: &AuthenticatedPrincipal,
        entry: &DirectoryEntry,
        config: &ProviderConfig,
    ) -> Result<Materialized, MaterializeError> {
        let username = entry.username.trim().to_lowercase();
        if username.is_empty() {
            return Err(MaterializeError::InvalidEntry(format!(
                "entry {} has no username",
                entry.dn
            )));
        }

        if config.validate_password_policy {
            if let Some(credential) = &entry.credential {
                let violations =
                    self.policy
                        .check(&username, entry.email.as_deref(), credential, Utc::now());
                if !violations.is_empty() {
                    debug!(
                        provider = %config.name,
                        username = %username,
                        violations = violations.len(),
                        "Directory credential violates password policy"
                    );
                    return Err(MaterializeError::PasswordPolicy(violations));
                }
            }
        }

        let materialized = match self.store.get_by_username(config.realm_id, &username).await? {
            Some(existing) => self.refresh(existing, principal, entry, config).await?,
            None => {
                let user = imported_user(config.realm_id, &username, principal, entry, config);
                match self.store.create(&user).await {
                    Ok(()) => Materialized {
                        user,
                        created: true,
                    },
                    Err(e) if e.is_duplicate() => {
                        // Concurrent first login won the create; apply ours as an update.
                        let existing = self
                            .store
                            .get_by_username(config.realm_id, &username)
                            .await?
                            .ok_or(e)?;
                        self.refresh(existing, principal, entry, config).await?
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let event_type = if materialized.created {
            EventType::UserImported
        } else {
            EventType::UserUpdated
        };
        self.events.on_event(
            &Event::builder(event_type)
                .realm(config.realm_id)
                .user(materialized.user.id)
                .principal(principal.principal.to_string())
                .provider(&config.name)
                .detail("username", &materialized.user.username)
                .build(),
        );
        info!(
            provider = %config.name,
            principal = %principal.principal,
            user_id = %materialized.user.id,
            created = materialized.created,
            "Federated user materialized"
        );

        Ok(materialized)
    }

    async fn refresh(
        &self,
        existing: User,
        principal: &AuthenticatedPrincipal,
        entry: &DirectoryEntry,
        config: &ProviderConfig,
    ) -> Result<Materialized, MaterializeError> {
        if !existing.is_linked_to(&config.name) {
            return Err(MaterializeError::LinkedElsewhere {
                username: existing.username,
                linked_to: existing.federation_link,
            });
        }

        let user = refreshed_user(existing, principal, entry, config);
        self.store.update(&user).await?;
        Ok(Materialized {
            user,
            created: false,
        })
    }

    /// Links an existing local user to another provider.
    ///
    /// This is the only way a user changes providers.
    ///
    /// ## Errors
    ///
    /// Returns `UserNotFound` if the user does not exist and `Storage` if the
    /// write fails.
    pub async fn reassign(
        &self,
        realm_id: Uuid,
        username: &str,
        config: &ProviderConfig,
    ) -> Result<User, MaterializeError> {
        let mut user = self
            .store
            .get_by_username(realm_id, username)
            .await?
            .ok_or_else(|| MaterializeError::UserNotFound(username.to_string()))?;

        let previous = user.federation_link.replace(config.name.clone());
        user.touch();
        self.store.update(&user).await?;

        self.events.on_event(
            &Event::builder(EventType::UserReassigned)
                .realm(realm_id)
                .user(user.id)
                .provider(&config.name)
                .detail("previous", previous.as_deref().unwrap_or(""))
                .build(),
        );
        info!(
            username = %user.username,
            from = previous.as_deref().unwrap_or("<local>"),
            to = %config.name,
            "User reassigned"
        );

        Ok(user)
    }
}

fn set_link_attributes(user: &mut User, principal: &AuthenticatedPrincipal, entry: &DirectoryEntry) {
    user.set_single_attribute(attributes::KERBEROS_PRINCIPAL, principal.principal.to_string());
    user.set_single_attribute(attributes::LDAP_ENTRY_DN, &entry.dn);
    if let Some(id) = &entry.id {
        user.set_single_attribute(attributes::LDAP_ID, id);
    }
}

fn imported_user(
    realm_id: Uuid,
    username: &str,
    principal: &AuthenticatedPrincipal,
    entry: &DirectoryEntry,
    config: &ProviderConfig,
) -> User {
    let mut user = User::new(realm_id, username).with_federation_link(&config.name);
    user.email.clone_from(&entry.email);
    user.email_verified = config.trust_email && entry.email.is_some();
    user.first_name.clone_from(&entry.first_name);
    user.last_name.clone_from(&entry.last_name);
    user.group_memberships.clone_from(&entry.groups);
    for (name, values) in &entry.attributes {
        user.set_attribute(name, values.clone());
    }
    set_link_attributes(&mut user, principal, entry);
    user
}

fn refreshed_user(
    mut user: User,
    principal: &AuthenticatedPrincipal,
    entry: &DirectoryEntry,
    config: &ProviderConfig,
) -> User {
    if config.edit_mode.refreshes_from_directory() {
        if user.email != entry.email {
            user.email.clone_from(&entry.email);
            user.email_verified = config.trust_email && entry.email.is_some();
        }
        user.first_name.clone_from(&entry.first_name);
        user.last_name.clone_from(&entry.last_name);
        user.group_memberships.clone_from(&entry.groups);
        for (name, values) in &entry.attributes {
            user.set_attribute(name, values.clone());
        }
    } else {
        if user.email.is_none() && entry.email.is_some() {
            user.email.clone_from(&entry.email);
            user.email_verified = config.trust_email;
        }
        if user.first_name.is_none() {
            user.first_name.clone_from(&entry.first_name);
        }
        if user.last_name.is_none() {
            user.last_name.clone_from(&entry.last_name);
        }
        if user.group_memberships.is_empty() {
            user.group_memberships.clone_from(&entry.groups);
        }
        for (name, values) in &entry.attributes {
            if user.get_attribute(name).is_none() {
                user.set_attribute(name, values.clone());
            }
        }
    }

    set_link_attributes(&mut user, principal, entry);
    user.touch();
    user
}
