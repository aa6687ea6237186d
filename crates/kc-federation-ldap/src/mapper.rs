//! Maps LDAP entries to directory records.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use kc_federation::{DirectoryCredential, DirectoryEntry};

use crate::config::LdapConfig;
use crate::error::{LdapError, LdapResult};
use crate::search::LdapEntry;

/// Seconds between 1601-01-01 (Windows FILETIME epoch) and the Unix epoch.
const FILETIME_UNIX_OFFSET_SECS: i64 = 11_644_473_600;

/// Maps LDAP user entries to [`DirectoryEntry`] values.
#[derive(Debug, Clone)]
pub struct LdapEntryMapper<'a> {
    config: &'a LdapConfig,
}

impl<'a> LdapEntryMapper<'a> {
    /// Creates a mapper for one provider configuration.
    #[must_use]
    pub const fn new(config: &'a LdapConfig) -> Self {
        Self { config }
    }

    /// Maps a user entry.
    ///
    /// Groups come from the membership attribute plus `extra_groups`
    /// (found by a group search), without duplicates.
    ///
    /// ## Errors
    ///
    /// Returns a mapping error if the entry has no username attribute.
    pub fn to_directory_entry(
        &self,
        entry: &LdapEntry,
        extra_groups: Vec<String>,
    ) -> LdapResult<DirectoryEntry> {
        let attrs = &self.config.attributes;
        let username = entry.get_attr(&attrs.username).ok_or_else(|| {
            LdapError::mapping(format!("entry {} has no {} attribute", entry.dn, attrs.username))
        })?;

        let mut mapped = DirectoryEntry::new(entry.dn.clone(), username);
        mapped.id = entry.external_id(&attrs.uuid);
        mapped.email = entry.get_attr(&attrs.email).map(String::from);
        mapped.first_name = entry.get_attr(&attrs.first_name).map(String::from);
        mapped.last_name = entry.get_attr(&attrs.last_name).map(String::from);

        let member_of = entry
            .get_attrs(&attrs.membership)
            .map(|dns| extract_group_names(dns))
            .unwrap_or_default();
        for group in member_of.into_iter().chain(extra_groups) {
            if !mapped.groups.contains(&group) {
                mapped.groups.push(group);
            }
        }

        if let Some(changed) = entry.get_attr(&attrs.password_changed) {
            mapped.credential = Some(DirectoryCredential {
                password: None,
                password_changed_at: parse_directory_time(changed),
            });
        }

        Ok(mapped)
    }
}

/// Extracts group names from member DNs.
#[must_use]
pub fn extract_group_names(member_of_dns: &[String]) -> Vec<String> {
    member_of_dns
        .iter()
        .filter_map(|dn| extract_cn_from_dn(dn))
        .collect()
}

/// Extracts CN from a DN.
fn extract_cn_from_dn(dn: &str) -> Option<String> {
    dn.split(',').map(str::trim).find_map(|part| {
        let (attr, value) = part.split_once('=')?;
        attr.eq_ignore_ascii_case("cn").then(|| value.to_string())
    })
}

/// Parses a directory timestamp.
///
/// Accepts generalized time (`20240131120000Z`, optionally with a
/// fraction) and Active Directory FILETIME (100ns ticks since 1601).
/// FILETIME `0` means "must change at next logon" and yields `None`.
#[must_use]
pub fn parse_directory_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Some(stripped) = value.strip_suffix('Z') {
        let seconds = stripped.split(['.', ',']).next()?;
        let naive = NaiveDateTime::parse_from_str(seconds, "%Y%m%d%H%M%S").ok()?;
        return Some(Utc.from_utc_datetime(&naive));
    }

    let ticks: i64 = value.parse().ok()?;
    if ticks <= 0 {
        return None;
    }
    DateTime::from_timestamp(ticks / 10_000_000 - FILETIME_UNIX_OFFSET_SECS, 0)
}
