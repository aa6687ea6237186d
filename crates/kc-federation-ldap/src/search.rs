//! LDAP search operations.
//!
//! Every search runs under the configured read timeout.

use std::collections::HashMap;

use ldap3::{ResultEntry, SearchEntry};

use crate::config::LdapConfig;
use crate::connection::LdapConnection;
use crate::error::{LdapError, LdapResult};

/// Represents an LDAP entry with parsed attributes.
#[derive(Debug, Clone, Default)]
pub struct LdapEntry {
    /// Distinguished Name.
    pub dn: String,

    /// Attributes (all values are multi-valued).
    pub attributes: HashMap<String, Vec<String>>,

    /// Binary attributes.
    pub binary_attributes: HashMap<String, Vec<Vec<u8>>>,
}

impl LdapEntry {
    /// Creates a new LDAP entry from search result.
    #[must_use]
    pub fn from_search_entry(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attributes: entry.attrs,
            binary_attributes: entry.bin_attrs,
        }
    }

    /// Gets a single-valued attribute.
    ///
    /// Attribute names are matched case-insensitively, as servers may
    /// return a different case than requested.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.get_attrs(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Gets a multi-valued attribute.
    #[must_use]
    pub fn get_attrs(&self, name: &str) -> Option<&Vec<String>> {
        self.attributes.get(name).or_else(|| {
            self.attributes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    /// Gets a binary attribute.
    #[must_use]
    pub fn get_binary_attr(&self, name: &str) -> Option<&Vec<u8>> {
        self.binary_attributes.get(name).and_then(|v| v.first())
    }

    /// Gets the external ID (UUID attribute value).
    #[must_use]
    pub fn external_id(&self, uuid_attr: &str) -> Option<String> {
        if let Some(val) = self.get_attr(uuid_attr) {
            return Some(val.to_string());
        }

        // Active Directory objectGUID is binary
        self.get_binary_attr(uuid_attr).map(|bytes| format_guid(bytes))
    }
}

/// Formats a binary GUID (Active Directory format) as a string.
fn format_guid(bytes: &[u8]) -> String {
    if bytes.len() != 16 {
        return hex::encode(bytes);
    }

    // Mixed endianness: the first three fields are little-endian.
    let mut ordered = Vec::with_capacity(16);
    ordered.extend(bytes[0..4].iter().rev());
    ordered.extend(bytes[4..6].iter().rev());
    ordered.extend(bytes[6..8].iter().rev());
    ordered.extend(&bytes[8..16]);

    let hex = hex::encode(ordered);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// LDAP search helper.
pub struct LdapSearcher<'a> {
    conn: &'a mut LdapConnection,
    config: &'a LdapConfig,
}

impl<'a> LdapSearcher<'a> {
    /// Creates a new searcher.
    pub fn new(conn: &'a mut LdapConnection, config: &'a LdapConfig) -> Self {
        Self { conn, config }
    }

    async fn search(
        &mut self,
        base: &str,
        scope: ldap3::Scope,
        filter: &str,
        attrs: Vec<&str>,
    ) -> LdapResult<Vec<ResultEntry>> {
        let result = self
            .conn
            .ldap_mut()
            .with_timeout(self.config.read_timeout)
            .search(base, scope, filter, attrs)
            .await;

        let result = match result {
            Ok(result) => result,
            Err(ldap3::LdapError::Timeout { .. }) => {
                self.conn.discard();
                return Err(LdapError::Timeout);
            }
            Err(e) => {
                self.conn.discard();
                return Err(LdapError::Search(e.to_string()));
            }
        };

        let (entries, _) = result
            .success()
            .map_err(|e| LdapError::Search(e.to_string()))?;
        Ok(entries)
    }

    /// Finds a user by username.
    ///
    /// ## Errors
    ///
    /// Returns [`LdapError::Timeout`] if the search exceeds the read
    /// timeout and [`LdapError::Search`] if the server rejects it.
    pub async fn find_user_by_username(&mut self, username: &str) -> LdapResult<Option<LdapEntry>> {
        let filter = self.config.user_by_username_filter(username);
        let users_dn = self.config.users_dn.clone();
        let scope = self.config.search_scope.to_ldap3();
        let config = self.config;

        let entries = self
            .search(&users_dn, scope, &filter, config.attributes.requested())
            .await?;

        Ok(entries
            .into_iter()
            .next()
            .map(SearchEntry::construct)
            .map(LdapEntry::from_search_entry))
    }

    /// Gets the group names of a user DN from the groups DN.
    ///
    /// Returns an empty list when no groups DN is configured.
    ///
    /// ## Errors
    ///
    /// Same as [`find_user_by_username`](Self::find_user_by_username).
    pub async fn find_groups_of(&mut self, user_dn: &str) -> LdapResult<Vec<String>> {
        let Some(groups_dn) = self.config.groups_dn.clone() else {
            return Ok(Vec::new());
        };
        let filter = self.config.groups_by_member_filter(user_dn);

        let entries = self
            .search(&groups_dn, ldap3::Scope::Subtree, &filter, vec!["cn"])
            .await?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .filter_map(|entry| entry.attrs.get("cn").and_then(|v| v.first()).cloned())
            .collect())
    }
}
