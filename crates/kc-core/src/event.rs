//! Audit events for the federation engine.
//!
//! ## NIST 800-53 Rev5: AU-2 (Event Logging)
//!
//! Every resolution emits exactly one login event. Imports, refreshes and
//! provider registry changes emit their own events.
//!
//! ## NIST 800-53 Rev5: AU-3 (Content of Audit Records)
//!
//! An event carries its time, type and outcome, plus the principal and
//! provider when they are known. Failures carry the internal reason, which
//! never reaches the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// A ticket resolved to a local user.
    Login,
    /// No provider produced an identity.
    LoginError,
    /// A ticket was accepted but the local password policy refused the user.
    PasswordPolicyError,

    /// First login created a local user.
    UserImported,
    /// A later login refreshed a federated user.
    UserUpdated,
    /// An administrator moved a user to another provider.
    UserReassigned,

    /// A provider entered the registry.
    ProviderRegistered,
    /// A provider's configuration was replaced in place.
    ProviderUpdated,
    /// A provider left the registry.
    ProviderRemoved,
}

/// Whether the operation took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    /// It did.
    Success,
    /// It did not; see [`Event::error`].
    Failure,
}

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Time-ordered id.
    pub id: Uuid,
    /// Wall-clock time of emission.
    pub timestamp: DateTime<Utc>,
    /// Kind of event.
    pub event_type: EventType,
    /// Success or failure.
    pub outcome: EventOutcome,
    /// Realm the engine serves.
    pub realm_id: Option<Uuid>,
    /// Local user, once materialized.
    pub user_id: Option<Uuid>,
    /// Authenticated or asserted Kerberos principal.
    pub principal: Option<String>,
    /// Provider that accepted, or the one being changed.
    pub provider: Option<String>,
    /// Internal failure reason.
    pub error: Option<String>,
    /// Ordered extra fields such as `attempts` or `realm_hint`.
    pub details: Vec<(String, String)>,
}

impl Event {
    /// Starts a successful event of the given type.
    #[must_use]
    pub const fn builder(event_type: EventType) -> EventBuilder {
        EventBuilder::new(event_type)
    }

    /// Looks up a detail by key.
    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Assembles an [`Event`]; the outcome defaults to success.
pub struct EventBuilder {
    event_type: EventType,
    outcome: EventOutcome,
    realm_id: Option<Uuid>,
    user_id: Option<Uuid>,
    principal: Option<String>,
    provider: Option<String>,
    error: Option<String>,
    details: Vec<(String, String)>,
}

impl EventBuilder {
    /// See [`Event::builder`].
    #[must_use]
    pub const fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            outcome: EventOutcome::Success,
            realm_id: None,
            user_id: None,
            principal: None,
            provider: None,
            error: None,
            details: Vec::new(),
        }
    }

    /// Marks the event failed with an internal reason.
    #[must_use]
    pub fn failure(mut self, reason: impl Into<String>) -> Self {
        self.outcome = EventOutcome::Failure;
        self.error = Some(reason.into());
        self
    }

    /// Sets the realm.
    #[must_use]
    pub const fn realm(mut self, realm_id: Uuid) -> Self {
        self.realm_id = Some(realm_id);
        self
    }

    /// Sets the local user.
    #[must_use]
    pub const fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Sets the principal.
    #[must_use]
    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Sets the provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Appends a detail; keys are not deduplicated.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push((key.into(), value.into()));
        self
    }

    /// Stamps id and time.
    #[must_use]
    pub fn build(self) -> Event {
        Event {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event_type: self.event_type,
            outcome: self.outcome,
            realm_id: self.realm_id,
            user_id: self.user_id,
            principal: self.principal,
            provider: self.provider,
            error: self.error,
            details: self.details,
        }
    }
}

// ============================================================================
// Listeners
// ============================================================================

/// Receives audit events.
///
/// Implementations must not block; they are called on the authentication
/// path.
pub trait EventListener: Send + Sync {
    /// Handles an event.
    fn on_event(&self, event: &Event);
}

/// Writes events to the `kc::audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventListener;

impl EventListener for TracingEventListener {
    fn on_event(&self, event: &Event) {
        let json = serde_json::to_string(event).unwrap_or_default();
        match event.outcome {
            EventOutcome::Success => tracing::info!(
                target: "kc::audit",
                event_type = ?event.event_type,
                provider = event.provider.as_deref(),
                principal = event.principal.as_deref(),
                event = %json,
                "audit"
            ),
            EventOutcome::Failure => tracing::warn!(
                target: "kc::audit",
                event_type = ?event.event_type,
                provider = event.provider.as_deref(),
                principal = event.principal.as_deref(),
                error = event.error.as_deref(),
                event = %json,
                "audit"
            ),
        }
    }
}

/// Keeps events in memory. Used by tests and the CLI diagnostics.
#[derive(Debug, Default)]
pub struct RecordingEventListener {
    events: parking_lot::Mutex<Vec<Event>>,
}

impl RecordingEventListener {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Returns the recorded events of one type.
    #[must_use]
    pub fn of_type(&self, event_type: EventType) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

impl EventListener for RecordingEventListener {
    fn on_event(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}
