//! # kc-federation-ldap
//!
//! LDAP directories for Kerberos federation providers.
//!
//! Once a provider's validator accepts a ticket, the principal's local
//! name is looked up here to find the directory entry behind it. The
//! [`LdapProviderFactory`] plugs this into a
//! [`RegistryConfigurationStore`](kc_federation::RegistryConfigurationStore)
//! under the `ldap` provider type.
//!
//! ## Security
//!
//! Only LDAPS is supported. STARTTLS and plain LDAP are rejected when the
//! configuration is built.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod connection;
pub mod error;
pub mod mapper;
pub mod provider;
pub mod search;

pub use config::{AttributeMapping, LdapConfig, LdapVendor, SearchScope};
pub use connection::{LdapConnection, LdapConnectionPool};
pub use error::{LdapError, LdapResult};
pub use mapper::LdapEntryMapper;
pub use provider::{LdapDirectory, LdapProviderFactory, PROVIDER_TYPE};
pub use search::{LdapEntry, LdapSearcher};
