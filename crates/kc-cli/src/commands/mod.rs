//! Command implementations.

pub mod keytab;
pub mod providers;
pub mod resolve;
pub mod ticket;

pub use keytab::run_keytab;
pub use providers::run_providers;
pub use resolve::run_resolve;
pub use ticket::run_ticket;

use std::sync::Arc;

use kc_core::{EngineConfig, TracingEventListener};
use kc_federation::{ProviderRegistry, RegistryConfigurationStore};
use kc_federation_kerberos::NegotiateHeader;
use kc_federation_ldap::LdapProviderFactory;
use uuid::Uuid;

use crate::error::{CliError, CliResult};

/// Builds a configuration store with every configured provider registered.
///
/// ## Errors
///
/// Returns an error if a provider cannot be built.
pub fn load_providers(engine: &EngineConfig) -> CliResult<RegistryConfigurationStore> {
    let store = RegistryConfigurationStore::new(
        Arc::new(ProviderRegistry::new()),
        Uuid::now_v7(),
        engine.clone(),
        Arc::new(TracingEventListener),
    )
    .with_factory(Arc::new(LdapProviderFactory));

    store.load(engine)?;
    Ok(store)
}

/// Decodes a `Negotiate <base64>` header value or a bare base64 token.
///
/// ## Errors
///
/// Returns an error if the value is not valid base64 or is too large.
pub fn parse_token(value: &str) -> CliResult<Vec<u8>> {
    let value = value.trim();
    let header = if value.contains(char::is_whitespace) {
        NegotiateHeader::parse(value)
    } else {
        NegotiateHeader::parse(&format!("{} {value}", NegotiateHeader::SCHEME))
    };
    header
        .map(NegotiateHeader::into_token)
        .map_err(|e| CliError::InvalidArgument(format!("token: {e}")))
}
