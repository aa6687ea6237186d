//! # kc-model
//!
//! Domain model for users federated through Kerberos providers.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod user;

pub use user::{attributes, User};
