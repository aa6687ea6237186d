//! One-shot ticket resolution with per-provider diagnostics.
//!
//! Users are materialized into a throwaway in-memory store, so nothing
//! outside the directory lookups is touched.

use std::sync::Arc;

use kc_core::{EngineConfig, EventListener, TracingEventListener};
use kc_federation::{
    IdentityMaterializer, InboundTicket, PasswordPolicy, ResolutionAttempt, ResolutionDispatcher,
    ResolvedIdentity,
};
use kc_federation_kerberos::PrincipalName;
use kc_storage::InMemoryUserStore;
use serde::Serialize;
use tabled::Tabled;

use crate::cli::ResolveArgs;
use crate::config::OutputFormat;
use crate::error::CliError;
use crate::output::{error, output, output_single, success};
use crate::CliConfig;

/// One provider attempt as shown by `resolve`.
#[derive(Debug, Serialize, Tabled)]
pub struct AttemptRow {
    /// Provider priority.
    #[tabled(rename = "Priority")]
    pub priority: i32,
    /// Provider name.
    #[tabled(rename = "Provider")]
    pub provider: String,
    /// Outcome label.
    #[tabled(rename = "Outcome")]
    pub outcome: String,
    /// Outcome detail.
    #[tabled(rename = "Detail")]
    pub detail: String,
}

impl From<&ResolutionAttempt> for AttemptRow {
    fn from(attempt: &ResolutionAttempt) -> Self {
        Self {
            priority: attempt.priority,
            provider: attempt.provider.clone(),
            outcome: attempt.outcome.kind().to_string(),
            detail: attempt.outcome.to_string(),
        }
    }
}

/// Result of one resolution.
#[derive(Debug, Serialize)]
pub struct ResolveReport {
    /// Resolved identity on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<ResolvedIdentity>,
    /// Failure description otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Providers consulted, in dispatch order.
    pub attempts: Vec<AttemptRow>,
}

/// Runs the resolve command.
///
/// ## Errors
///
/// Returns an error if the configuration is invalid or the ticket is not
/// resolved.
pub async fn run_resolve(
    args: ResolveArgs,
    config: &CliConfig,
    format: OutputFormat,
) -> crate::CliResult<()> {
    let token = super::parse_token(&args.token)?;
    let report = resolve(&config.engine, token, args.principal.as_deref()).await?;

    match format {
        OutputFormat::Json => output_single(&report, format)?,
        OutputFormat::Table => {
            output(&report.attempts, format)?;
            if let Some(identity) = &report.identity {
                success(&format!(
                    "Resolved {} as {} via {}",
                    identity.principal, identity.username, identity.source_provider
                ));
                output_single(identity, format)?;
            }
        }
    }

    match report.failure {
        Some(failure) => {
            if format == OutputFormat::Table {
                error(&failure);
            }
            Err(CliError::Resolution(failure))
        }
        None => Ok(()),
    }
}

/// Resolves a token against the configured providers.
///
/// ## Errors
///
/// Returns an error if the configuration is invalid. A rejected ticket is
/// reported in [`ResolveReport::failure`].
pub async fn resolve(
    engine: &EngineConfig,
    token: Vec<u8>,
    asserted_principal: Option<&str>,
) -> crate::CliResult<ResolveReport> {
    let store = super::load_providers(engine)?;
    let policy: PasswordPolicy = engine.password_policy.parse()?;
    let events: Arc<dyn EventListener> = Arc::new(TracingEventListener);

    let materializer = IdentityMaterializer::new(Arc::new(InMemoryUserStore::new()), events.clone())
        .with_policy(policy);
    let dispatcher =
        ResolutionDispatcher::new(store.registry().clone(), Arc::new(materializer), events);

    let mut ticket = InboundTicket::new(token);
    if let Some(principal) = asserted_principal {
        ticket = ticket.with_asserted_principal(PrincipalName::parse(principal)?);
    }

    let resolution = dispatcher.resolve_traced(&ticket).await;
    let attempts = resolution.attempts.iter().map(AttemptRow::from).collect();

    Ok(match resolution.outcome {
        Ok(identity) => ResolveReport {
            identity: Some(identity),
            failure: None,
            attempts,
        },
        Err(failure) => ResolveReport {
            identity: None,
            failure: Some(failure.to_string()),
            attempts,
        },
    })
}
