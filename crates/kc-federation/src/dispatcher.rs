//! Resolution dispatcher.
//!
//! ## NIST 800-53 Rev5: IA-2 (Identification and Authentication)
//!
//! Routes an inbound SPNEGO ticket across the registered providers until
//! one accepts it. For each enabled provider, in priority order:
//!
//! 1. realm pre-check against the realm of the asserted client principal,
//!    skipped when the client asserts none
//! 2. cryptographic validation with the provider's keytab
//! 3. realm post-check against the authenticated principal
//! 4. directory lookup by local name, bounded by the lookup timeout
//!
//! The first provider to pass all four is the source of the identity;
//! later providers are not consulted. Per-provider failures are recorded
//! as [`ResolutionAttempt`]s and never escape the loop.
//!
//! Dispatch is driven by the ticket alone. Each call gets its own
//! [`ResolutionContext`], so concurrent resolutions share nothing but the
//! registry snapshot they read.

use std::fmt;
use std::sync::Arc;

use kc_core::{Event, EventListener, EventType};
use kc_federation_kerberos::{
    AcceptError, AuthenticatedPrincipal, NegotiateHeader, PrincipalName, ValidationError,
};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::attempt::{AttemptOutcome, ResolutionAttempt};
use crate::error::{AuthFailure, LookupError, MaterializeError};
use crate::materializer::IdentityMaterializer;
use crate::provider::{DirectoryEntry, FederatedProvider};
use crate::registry::ProviderRegistry;

// ============================================================================
// Request and response types
// ============================================================================

/// An inbound SPNEGO token.
#[derive(Clone, PartialEq, Eq)]
pub struct InboundTicket {
    token: Vec<u8>,
    asserted_principal: Option<PrincipalName>,
}

impl InboundTicket {
    /// Wraps a token.
    #[must_use]
    pub fn new(token: impl Into<Vec<u8>>) -> Self {
        Self {
            token: token.into(),
            asserted_principal: None,
        }
    }

    /// Attaches the principal the client claims to be. It is a routing hint
    /// only and never trusted.
    #[must_use]
    pub fn with_asserted_principal(mut self, principal: PrincipalName) -> Self {
        self.asserted_principal = Some(principal);
        self
    }

    /// Parses an `Authorization: Negotiate <base64>` header value.
    ///
    /// ## Errors
    ///
    /// Returns `MalformedToken` if the header is not a Negotiate header.
    pub fn from_header(value: &str) -> Result<Self, ValidationError> {
        Ok(Self::new(NegotiateHeader::parse(value)?.into_token()))
    }

    /// Returns the token bytes.
    #[must_use]
    pub fn token(&self) -> &[u8] {
        &self.token
    }

    /// Returns the asserted principal.
    #[must_use]
    pub const fn asserted_principal(&self) -> Option<&PrincipalName> {
        self.asserted_principal.as_ref()
    }

    /// Realm used for the cheap pre-check: the asserted principal's realm.
    ///
    /// The cleartext realm of the token names the service, not the client,
    /// so a token without an asserted principal yields no hint and is only
    /// checked against the authenticated realm.
    #[must_use]
    pub fn realm_hint(&self) -> Option<String> {
        self.asserted_principal
            .as_ref()
            .map(|p| p.realm().to_string())
    }
}

impl fmt::Debug for InboundTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundTicket")
            .field("token", &format_args!("[{} bytes]", self.token.len()))
            .field("asserted_principal", &self.asserted_principal)
            .finish()
    }
}

/// The local identity a ticket resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedIdentity {
    /// Local user id.
    pub user_id: Uuid,
    /// Local username.
    pub username: String,
    /// Email.
    pub email: Option<String>,
    /// DN of the directory entry.
    pub directory_dn: String,
    /// Directory groups.
    pub group_memberships: Vec<String>,
    /// Name of the provider that accepted the ticket.
    pub source_provider: String,
    /// Authenticated Kerberos principal.
    pub principal: String,
    /// Whether this login created the local user.
    pub created: bool,
}

/// Outcome of a resolution plus the attempts that led to it.
#[derive(Debug)]
pub struct Resolution {
    /// Final outcome.
    pub outcome: Result<ResolvedIdentity, AuthFailure>,
    /// One entry per consulted provider, in dispatch order.
    pub attempts: Vec<ResolutionAttempt>,
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Per-call dispatch state.
struct ResolutionContext<'a> {
    ticket: &'a InboundTicket,
    hint: Option<String>,
    attempts: Vec<ResolutionAttempt>,
}

impl<'a> ResolutionContext<'a> {
    fn new(ticket: &'a InboundTicket) -> Self {
        Self {
            ticket,
            hint: ticket.realm_hint(),
            attempts: Vec::new(),
        }
    }

    fn record(&mut self, provider: &FederatedProvider, outcome: AttemptOutcome) {
        debug!(
            provider = provider.name(),
            priority = provider.priority(),
            outcome = outcome.kind(),
            detail = %outcome,
            "Provider attempt"
        );
        self.attempts.push(ResolutionAttempt::new(
            provider.name(),
            provider.priority(),
            outcome,
        ));
    }
}

/// Resolves inbound tickets to local identities.
pub struct ResolutionDispatcher {
    registry: Arc<ProviderRegistry>,
    materializer: Arc<IdentityMaterializer>,
    events: Arc<dyn EventListener>,
}

impl ResolutionDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        materializer: Arc<IdentityMaterializer>,
        events: Arc<dyn EventListener>,
    ) -> Self {
        Self {
            registry,
            materializer,
            events,
        }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Resolves a ticket to a local identity.
    ///
    /// ## Errors
    ///
    /// Returns an [`AuthFailure`]; only its `public_message` may reach the
    /// client.
    pub async fn resolve(&self, ticket: &InboundTicket) -> Result<ResolvedIdentity, AuthFailure> {
        self.resolve_traced(ticket).await.outcome
    }

    /// Resolves the value of an `Authorization` header.
    ///
    /// An unparseable header fails like an exhausted dispatch.
    ///
    /// ## Errors
    ///
    /// See [`Self::resolve`].
    pub async fn resolve_negotiate(&self, header: &str) -> Result<ResolvedIdentity, AuthFailure> {
        match InboundTicket::from_header(header) {
            Ok(ticket) => self.resolve(&ticket).await,
            Err(e) => {
                warn!(error = %e, "Rejected Authorization header");
                self.events.on_event(
                    &Event::builder(EventType::LoginError)
                        .failure(e.to_string())
                        .detail("attempts", "0")
                        .build(),
                );
                Err(AuthFailure::AllProvidersExhausted {
                    attempts: Vec::new(),
                })
            }
        }
    }

    /// Resolves a ticket and returns every attempt, also on success.
    pub async fn resolve_traced(&self, ticket: &InboundTicket) -> Resolution {
        let mut ctx = ResolutionContext::new(ticket);
        let span = info_span!("resolve", realm_hint = ctx.hint.as_deref().unwrap_or("-"));

        async move {
            let outcome = self.dispatch(&mut ctx).await;
            Resolution {
                outcome,
                attempts: ctx.attempts,
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch(
        &self,
        ctx: &mut ResolutionContext<'_>,
    ) -> Result<ResolvedIdentity, AuthFailure> {
        let providers = self.registry.enabled_snapshot();
        debug!(providers = providers.len(), "Dispatching ticket");

        for provider in &providers {
            match self.evaluate(provider, ctx).await {
                Ok((principal, entry)) => {
                    ctx.record(
                        provider,
                        AttemptOutcome::Accepted {
                            principal: principal.principal.clone(),
                            dn: entry.dn.clone(),
                        },
                    );
                    return self.complete(provider, &principal, &entry).await;
                }
                Err(outcome) => ctx.record(provider, outcome),
            }
        }

        warn!(attempts = ctx.attempts.len(), "All providers exhausted");
        let mut event = Event::builder(EventType::LoginError)
            .failure("all providers exhausted")
            .detail("attempts", ctx.attempts.len().to_string());
        if let Some(hint) = &ctx.hint {
            event = event.detail("realm_hint", hint);
        }
        self.events.on_event(&event.build());

        Err(AuthFailure::AllProvidersExhausted {
            attempts: ctx.attempts.clone(),
        })
    }

    async fn evaluate(
        &self,
        provider: &FederatedProvider,
        ctx: &ResolutionContext<'_>,
    ) -> Result<(AuthenticatedPrincipal, DirectoryEntry), AttemptOutcome> {
        let config = provider.config();
        let policy = config.realm_policy();

        if let Some(hint) = &ctx.hint {
            if !policy.matches(hint) {
                return Err(AttemptOutcome::RealmMismatch {
                    expected: policy.to_string(),
                    actual: hint.clone(),
                });
            }
        }

        let validator = provider.validator().ok_or_else(|| {
            AttemptOutcome::ConfigurationFault("Kerberos authentication is disabled".into())
        })?;

        let principal = match validator.validate(ctx.ticket.token()).await {
            Ok(principal) => principal,
            Err(AcceptError::Validation(e)) => return Err(AttemptOutcome::ValidationFailed(e)),
            Err(AcceptError::Configuration(reason)) => {
                error!(
                    provider = provider.name(),
                    reason = %reason,
                    "Provider cannot validate tickets"
                );
                return Err(AttemptOutcome::ConfigurationFault(reason));
            }
        };

        if !policy.matches(principal.realm()) {
            return Err(AttemptOutcome::RealmMismatch {
                expected: policy.to_string(),
                actual: principal.realm().to_string(),
            });
        }

        let username = principal.principal.local_name();
        let lookup = tokio::time::timeout(
            config.lookup_timeout,
            provider.directory().lookup(&username),
        )
        .await;

        match lookup {
            Ok(Ok(entry)) => Ok((principal, entry)),
            Ok(Err(e)) => Err(AttemptOutcome::DirectoryLookupFailed(e)),
            Err(_) => {
                warn!(
                    provider = provider.name(),
                    timeout_ms = u64::try_from(config.lookup_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Directory lookup timed out"
                );
                Err(AttemptOutcome::DirectoryLookupFailed(LookupError::Timeout))
            }
        }
    }

    async fn complete(
        &self,
        provider: &FederatedProvider,
        principal: &AuthenticatedPrincipal,
        entry: &DirectoryEntry,
    ) -> Result<ResolvedIdentity, AuthFailure> {
        let config = provider.config();
        let name = provider.name().to_string();

        match self.materializer.materialize(principal, entry, config).await {
            Ok(materialized) => {
                let user = materialized.user;
                info!(
                    provider = %name,
                    principal = %principal.principal,
                    user_id = %user.id,
                    "Kerberos login resolved"
                );
                self.events.on_event(
                    &Event::builder(EventType::Login)
                        .realm(config.realm_id)
                        .user(user.id)
                        .principal(principal.principal.to_string())
                        .provider(&name)
                        .build(),
                );

                Ok(ResolvedIdentity {
                    user_id: user.id,
                    username: user.username,
                    email: user.email,
                    directory_dn: entry.dn.clone(),
                    group_memberships: user.group_memberships,
                    source_provider: name,
                    principal: principal.principal.to_string(),
                    created: materialized.created,
                })
            }
            Err(e) => {
                let event_type = if matches!(e, MaterializeError::PasswordPolicy(_)) {
                    EventType::PasswordPolicyError
                } else {
                    EventType::LoginError
                };
                warn!(provider = %name, principal = %principal.principal, error = %e, "Login rejected after ticket acceptance");
                self.events.on_event(
                    &Event::builder(event_type)
                        .failure(e.to_string())
                        .realm(config.realm_id)
                        .principal(principal.principal.to_string())
                        .provider(&name)
                        .build(),
                );

                Err(match e {
                    MaterializeError::PasswordPolicy(violations) => {
                        AuthFailure::PasswordPolicyViolation {
                            provider: name,
                            violations,
                        }
                    }
                    MaterializeError::LinkedElsewhere {
                        username,
                        linked_to,
                    } => AuthFailure::IdentityConflict {
                        provider: name,
                        username,
                        linked_to,
                    },
                    other => AuthFailure::Materialization {
                        provider: name,
                        reason: other.to_string(),
                    },
                })
            }
        }
    }
}
