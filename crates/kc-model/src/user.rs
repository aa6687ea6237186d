//! Local user record.
//!
//! Users federated from a directory are materialized into a local record
//! that remembers which provider they came from. The record is the
//! authoritative identity once a login has been accepted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known attribute names written during federation.
pub mod attributes {
    /// Full Kerberos principal that authenticated the user.
    pub const KERBEROS_PRINCIPAL: &str = "KERBEROS_PRINCIPAL";
    /// Distinguished name of the backing directory entry.
    pub const LDAP_ENTRY_DN: &str = "LDAP_ENTRY_DN";
    /// Stable directory identifier (e.g. `entryUUID`).
    pub const LDAP_ID: &str = "LDAP_ID";
}

/// A local user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Record id, assigned on first import.
    pub id: Uuid,
    /// Owning realm.
    pub realm_id: Uuid,
    /// Lower-case login name; unique per realm.
    pub username: String,
    /// Disabled users are never returned as an authenticated identity.
    pub enabled: bool,

    /// Given name copied from the directory.
    pub first_name: Option<String>,
    /// Family name copied from the directory.
    pub last_name: Option<String>,
    /// Mail address copied from the directory or edited locally.
    pub email: Option<String>,
    /// Set on import when the provider trusts directory mail addresses.
    pub email_verified: bool,

    /// First import.
    pub created_at: DateTime<Utc>,
    /// Last refresh or local edit.
    pub updated_at: DateTime<Utc>,

    /// Name of the provider that owns this record.
    ///
    /// `None` means a local-only account.
    pub federation_link: Option<String>,
    /// Directory groups, in directory order.
    pub group_memberships: Vec<String>,

    /// Multi-valued attributes such as [`attributes::KERBEROS_PRINCIPAL`].
    pub attributes: HashMap<String, Vec<String>>,
}

impl User {
    /// Creates an enabled, unlinked user. The username is lower-cased.
    #[must_use]
    pub fn new(realm_id: Uuid, username: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            realm_id,
            username: username.into().to_lowercase(),
            enabled: true,
            first_name: None,
            last_name: None,
            email: None,
            email_verified: false,
            created_at: now,
            updated_at: now,
            federation_link: None,
            group_memberships: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    /// Replaces the mail address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Marks the record as owned by `provider`.
    #[must_use]
    pub fn with_federation_link(mut self, provider: impl Into<String>) -> Self {
        self.federation_link = Some(provider.into());
        self
    }

    /// Appends a directory group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group_memberships.push(group.into());
        self
    }

    /// True when `provider` owns this record.
    #[must_use]
    pub fn is_linked_to(&self, provider: &str) -> bool {
        self.federation_link.as_deref() == Some(provider)
    }

    /// True for accounts created locally rather than imported.
    #[must_use]
    pub const fn is_local_only(&self) -> bool {
        self.federation_link.is_none()
    }

    /// True if the directory reported membership in `group`.
    #[must_use]
    pub fn is_member_of(&self, group: &str) -> bool {
        self.group_memberships.iter().any(|g| g == group)
    }

    /// All values of an attribute.
    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&Vec<String>> {
        self.attributes.get(name)
    }

    /// First value of an attribute.
    #[must_use]
    pub fn get_first_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Replaces all values of an attribute.
    pub fn set_attribute(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.attributes.insert(name.into(), values);
    }

    /// Replaces an attribute with one value.
    pub fn set_single_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), vec![value.into()]);
    }

    /// Records a modification now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
