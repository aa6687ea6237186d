//! Realm policy.
//!
//! A provider may restrict which Kerberos realm its tickets come from. An
//! empty or unset expected realm matches any realm; otherwise matching is
//! exact and case-sensitive, as Kerberos realm names are.

use std::fmt;

/// Returns whether `ticket_realm` satisfies `expected_realm`.
#[must_use]
pub fn matches(ticket_realm: &str, expected_realm: Option<&str>) -> bool {
    match expected_realm {
        None | Some("") => true,
        Some(expected) => expected == ticket_realm,
    }
}

/// Per-provider expected realm.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealmPolicy {
    expected: Option<String>,
}

impl RealmPolicy {
    /// Creates a policy. `None` and the empty string both mean "any realm".
    #[must_use]
    pub fn new(expected: Option<&str>) -> Self {
        Self {
            expected: expected
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
        }
    }

    /// Policy that accepts every realm.
    #[must_use]
    pub const fn any() -> Self {
        Self { expected: None }
    }

    /// Policy that accepts only `realm`.
    #[must_use]
    pub fn exactly(realm: impl Into<String>) -> Self {
        Self::new(Some(&realm.into()))
    }

    /// The expected realm, if restricted.
    #[must_use]
    pub fn expected(&self) -> Option<&str> {
        self.expected.as_deref()
    }

    /// Returns whether this policy accepts every realm.
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        self.expected.is_none()
    }

    /// Returns whether `ticket_realm` is accepted.
    #[must_use]
    pub fn matches(&self, ticket_realm: &str) -> bool {
        matches(ticket_realm, self.expected())
    }
}

impl fmt::Display for RealmPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.expected().unwrap_or("*"))
    }
}
