//! Storage error types.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Unique key of a stored user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserKey {
    /// Record id.
    Id,
    /// Username, unique per realm and case-insensitive.
    Username,
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Id => "id",
            Self::Username => "username",
        })
    }
}

/// Errors raised by a user store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No user with this id in the realm.
    #[error("user {0} not found")]
    UserNotFound(Uuid),

    /// A user already holds this unique key.
    #[error("user {key} '{value}' is already taken")]
    Duplicate {
        /// Conflicting key.
        key: UserKey,
        /// Conflicting value.
        value: String,
    },

    /// The backend could not be reached or refused the write.
    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Creates a duplicate-key error.
    #[must_use]
    pub fn duplicate(key: UserKey, value: impl Into<String>) -> Self {
        Self::Duplicate {
            key,
            value: value.into(),
        }
    }

    /// True if the user does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::UserNotFound(_))
    }

    /// True when a concurrent writer already created the record; callers
    /// may re-read and update instead.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
