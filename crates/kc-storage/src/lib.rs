//! # kc-storage
//!
//! Storage abstraction for local user records.
//!
//! ## Provider Traits
//!
//! - [`UserProvider`] - CRUD operations for users
//!
//! [`InMemoryUserStore`] is the bundled implementation.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod memory;
pub mod user;

pub use error::{StorageError, StorageResult, UserKey};
pub use memory::InMemoryUserStore;
pub use user::UserProvider;
