//! # kc-federation
//!
//! Multi-realm Kerberos federation for user storage providers.
//!
//! A realm may register several LDAP-backed providers, each bound to a
//! Kerberos realm through its service keytab and an optional expected
//! realm. The [`ResolutionDispatcher`] routes an inbound SPNEGO ticket to
//! the provider that can validate it and materializes the local user.
//!
//! ## Components
//!
//! - [`realm`] - expected realm matching
//! - [`config`] - typed provider configuration
//! - [`provider`] - providers and the [`DirectoryLookup`] seam
//! - [`registry`] - ordered, lock-free provider snapshots
//! - [`store`] - administrative configuration changes
//! - [`dispatcher`] - ticket routing
//! - [`materializer`] - local user creation and refresh
//! - [`policy`] - local password policy
//!
//! ## NIST 800-53 Rev5 Controls
//!
//! - IA-2: Identification and Authentication
//! - IA-5: Authenticator Management
//! - IA-6: Authentication Feedback
//! - AU-2: Event Logging

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod attempt;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod materializer;
pub mod policy;
pub mod provider;
pub mod realm;
pub mod registry;
pub mod store;

pub use attempt::{AttemptOutcome, ResolutionAttempt};
pub use config::{EditMode, KerberosSettings, ProviderConfig, ProviderConfigBuilder};
pub use dispatcher::{InboundTicket, Resolution, ResolutionDispatcher, ResolvedIdentity};
pub use error::{AuthFailure, FederationError, FederationResult, LookupError, MaterializeError};
pub use materializer::{IdentityMaterializer, Materialized};
pub use policy::{PasswordPolicy, PolicyRule, PolicyViolation};
pub use provider::{DirectoryCredential, DirectoryEntry, DirectoryLookup, FederatedProvider};
pub use realm::RealmPolicy;
pub use registry::{ProviderRegistry, ProviderSnapshot};
pub use store::{ConfigurationStore, ProviderChange, ProviderFactory, RegistryConfigurationStore};
