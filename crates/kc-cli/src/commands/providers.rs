//! Provider listing.

use kc_federation::FederatedProvider;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::ProvidersCommand;
use crate::config::OutputFormat;
use crate::output::{output, warning};
use crate::CliConfig;

/// One provider as shown by `providers list`.
#[derive(Debug, Serialize, Tabled)]
pub struct ProviderRow {
    /// Provider name.
    #[tabled(rename = "Name")]
    pub name: String,
    /// Provider type.
    #[tabled(rename = "Type")]
    pub provider_type: String,
    /// Dispatch priority.
    #[tabled(rename = "Priority")]
    pub priority: i32,
    /// Enabled flag.
    #[tabled(rename = "Enabled")]
    pub enabled: bool,
    /// Service principal, or `-` without Kerberos.
    #[tabled(rename = "Service Principal")]
    pub service_principal: String,
    /// Accepted ticket realms.
    #[tabled(rename = "Realms")]
    pub realms: String,
    /// Edit mode.
    #[tabled(rename = "Edit Mode")]
    pub edit_mode: String,
    /// Whether dispatch consults this provider.
    #[tabled(rename = "Dispatched")]
    pub dispatched: bool,
}

impl From<&FederatedProvider> for ProviderRow {
    fn from(provider: &FederatedProvider) -> Self {
        let config = provider.config();
        Self {
            name: config.name.clone(),
            provider_type: config.provider_type.clone(),
            priority: config.priority,
            enabled: config.enabled,
            service_principal: config
                .kerberos
                .as_ref()
                .map_or_else(|| "-".to_string(), |k| k.credential.service_principal.to_string()),
            realms: config.realm_policy().to_string(),
            edit_mode: config.edit_mode.to_string(),
            dispatched: provider.accepts_tickets(),
        }
    }
}

/// Runs a providers command.
///
/// ## Errors
///
/// Returns an error if a configured provider is invalid.
pub fn run_providers(
    cmd: ProvidersCommand,
    config: &CliConfig,
    format: OutputFormat,
) -> crate::CliResult<()> {
    match cmd {
        ProvidersCommand::List => {
            let store = super::load_providers(&config.engine)?;
            let rows: Vec<ProviderRow> = store
                .registry()
                .list()
                .iter()
                .map(|p| ProviderRow::from(p.as_ref()))
                .collect();
            output(&rows, format)?;

            let skipped = rows.iter().filter(|r| !r.dispatched).count();
            if skipped > 0 && format == OutputFormat::Table {
                warning(&format!(
                    "{skipped} provider(s) are disabled or lack Kerberos settings and are skipped during dispatch"
                ));
            }
            Ok(())
        }
    }
}
