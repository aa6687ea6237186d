//! User storage provider trait.

use async_trait::async_trait;
use kc_model::User;
use uuid::Uuid;

use crate::error::StorageResult;

/// Provider for local user storage operations.
///
/// Implementations must be thread-safe and support concurrent access.
/// Each write is applied as a whole or not at all.
#[async_trait]
pub trait UserProvider: Send + Sync {
    /// Creates a new user.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::Duplicate` if the username is taken in the realm.
    async fn create(&self, user: &User) -> StorageResult<()>;

    /// Replaces an existing user record.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::UserNotFound` if the user doesn't exist.
    async fn update(&self, user: &User) -> StorageResult<()>;

    /// Deletes a user by ID.
    ///
    /// ## Errors
    ///
    /// Returns `StorageError::UserNotFound` if the user doesn't exist.
    async fn delete(&self, realm_id: Uuid, id: Uuid) -> StorageResult<()>;

    /// Gets a user by ID.
    async fn get_by_id(&self, realm_id: Uuid, id: Uuid) -> StorageResult<Option<User>>;

    /// Gets a user by username (case-insensitive).
    async fn get_by_username(&self, realm_id: Uuid, username: &str) -> StorageResult<Option<User>>;

    /// Lists the users linked to a provider.
    async fn get_by_federation_link(&self, realm_id: Uuid, provider: &str) -> StorageResult<Vec<User>>;

    /// Counts users in a realm.
    async fn count(&self, realm_id: Uuid) -> StorageResult<u64>;
}
