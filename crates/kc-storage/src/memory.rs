//! In-memory user storage.

use std::collections::HashMap;

use async_trait::async_trait;
use kc_model::User;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult, UserKey};
use crate::user::UserProvider;

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    // (realm, lower-case username) -> id
    by_username: HashMap<(Uuid, String), Uuid>,
}

/// User store backed by a `HashMap` behind a read-write lock.
///
/// Every mutation happens inside a single write critical section, so readers
/// never observe a half-written record.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    inner: RwLock<Inner>,
}

impl InMemoryUserStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every stored user.
    #[must_use]
    pub fn snapshot(&self) -> Vec<User> {
        self.inner.read().users.values().cloned().collect()
    }
}

#[async_trait]
impl UserProvider for InMemoryUserStore {
    async fn create(&self, user: &User) -> StorageResult<()> {
        let key = (user.realm_id, user.username.to_lowercase());
        let mut inner = self.inner.write();

        if inner.by_username.contains_key(&key) {
            return Err(StorageError::duplicate(UserKey::Username, &user.username));
        }
        if inner.users.contains_key(&user.id) {
            return Err(StorageError::duplicate(UserKey::Id, user.id.to_string()));
        }

        inner.by_username.insert(key, user.id);
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update(&self, user: &User) -> StorageResult<()> {
        let mut inner = self.inner.write();

        let Some(existing) = inner.users.get(&user.id) else {
            return Err(StorageError::UserNotFound(user.id));
        };
        let old_key = (existing.realm_id, existing.username.to_lowercase());
        let new_key = (user.realm_id, user.username.to_lowercase());

        if old_key != new_key {
            if inner.by_username.contains_key(&new_key) {
                return Err(StorageError::duplicate(UserKey::Username, &user.username));
            }
            inner.by_username.remove(&old_key);
            inner.by_username.insert(new_key, user.id);
        }

        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn delete(&self, realm_id: Uuid, id: Uuid) -> StorageResult<()> {
        let mut inner = self.inner.write();

        match inner.users.get(&id) {
            Some(user) if user.realm_id == realm_id => {
                let key = (realm_id, user.username.to_lowercase());
                inner.by_username.remove(&key);
                inner.users.remove(&id);
                Ok(())
            }
            _ => Err(StorageError::UserNotFound(id)),
        }
    }

    async fn get_by_id(&self, realm_id: Uuid, id: Uuid) -> StorageResult<Option<User>> {
        Ok(self
            .inner
            .read()
            .users
            .get(&id)
            .filter(|u| u.realm_id == realm_id)
            .cloned())
    }

    async fn get_by_username(&self, realm_id: Uuid, username: &str) -> StorageResult<Option<User>> {
        let inner = self.inner.read();
        Ok(inner
            .by_username
            .get(&(realm_id, username.to_lowercase()))
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    async fn get_by_federation_link(&self, realm_id: Uuid, provider: &str) -> StorageResult<Vec<User>> {
        Ok(self
            .inner
            .read()
            .users
            .values()
            .filter(|u| u.realm_id == realm_id && u.is_linked_to(provider))
            .cloned()
            .collect())
    }

    async fn count(&self, realm_id: Uuid) -> StorageResult<u64> {
        Ok(self
            .inner
            .read()
            .users
            .values()
            .filter(|u| u.realm_id == realm_id)
            .count() as u64)
    }
}
