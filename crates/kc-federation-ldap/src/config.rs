//! LDAP provider configuration.
//!
//! ## Security Requirements
//!
//! **CRITICAL**: Only LDAPS (LDAP over TLS) is supported.
//!
//! - Connection URLs MUST start with `ldaps://`
//! - STARTTLS is NOT supported (vulnerable to downgrade attacks)
//! - Plain `ldap://` is NOT supported (credentials transmitted in cleartext)

use std::time::Duration;

use kc_federation::config::keys;
use kc_federation::ProviderConfig;
use serde::{Deserialize, Serialize};

use crate::error::{LdapError, LdapResult};

/// Component key for the LDAP vendor.
pub const VENDOR: &str = "vendor";
/// Component key for the group membership attribute.
pub const MEMBERSHIP_ATTRIBUTE: &str = "membershipLDAPAttribute";
/// Component key for the password change time attribute.
pub const PASSWORD_CHANGED_ATTRIBUTE: &str = "passwordChangedLDAPAttribute";
/// Component key for certificate validation.
pub const VALIDATE_CERTIFICATES: &str = "validateCertificates";
/// Component key for the connection pool size.
pub const CONNECTION_POOL_SIZE: &str = "connectionPoolingSize";

const DEFAULT_POOL_SIZE: usize = 10;

// ============================================================================
// Vendor defaults
// ============================================================================

/// Directory vendor, which decides the schema defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LdapVendor {
    /// Generic RFC 4510 directory.
    #[default]
    Other,
    /// Microsoft Active Directory.
    ActiveDirectory,
    /// Red Hat / 389 Directory Server.
    Rhds,
    /// OpenLDAP.
    OpenLdap,
}

impl LdapVendor {
    /// Parses the admin console vendor id (`ad`, `rhds`, `openldap`, `other`).
    ///
    /// ## Errors
    ///
    /// Returns a configuration error for unknown vendors.
    pub fn from_id(id: &str) -> LdapResult<Self> {
        match id.trim().to_lowercase().as_str() {
            "ad" | "active_directory" => Ok(Self::ActiveDirectory),
            "rhds" => Ok(Self::Rhds),
            "openldap" => Ok(Self::OpenLdap),
            "" | "other" => Ok(Self::Other),
            other => Err(LdapError::config(format!("unknown vendor '{other}'"))),
        }
    }

    /// Object class of user entries.
    #[must_use]
    pub const fn user_object_class(self) -> &'static str {
        match self {
            Self::ActiveDirectory => "person",
            _ => "inetOrgPerson",
        }
    }
}

/// Names of the user entry attributes the provider reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMapping {
    /// Username, matched against the principal's local name.
    pub username: String,
    /// Stable external id.
    pub uuid: String,
    /// Email address.
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Surname.
    pub last_name: String,
    /// Group DNs on the user entry.
    pub membership: String,
    /// Last password change, generalized time or FILETIME.
    pub password_changed: String,
}

impl AttributeMapping {
    /// Schema defaults of a vendor.
    #[must_use]
    pub fn for_vendor(vendor: LdapVendor) -> Self {
        let ad = vendor == LdapVendor::ActiveDirectory;
        let uuid = match vendor {
            LdapVendor::ActiveDirectory => "objectGUID",
            LdapVendor::Rhds => "nsUniqueId",
            LdapVendor::OpenLdap | LdapVendor::Other => "entryUUID",
        };
        Self {
            username: if ad { "sAMAccountName" } else { "uid" }.to_string(),
            uuid: uuid.to_string(),
            email: "mail".to_string(),
            first_name: "givenName".to_string(),
            last_name: "sn".to_string(),
            membership: "memberOf".to_string(),
            password_changed: if ad { "pwdLastSet" } else { "pwdChangedTime" }.to_string(),
        }
    }

    /// Attribute list for user searches.
    #[must_use]
    pub fn requested(&self) -> Vec<&str> {
        [
            &self.username,
            &self.uuid,
            &self.email,
            &self.first_name,
            &self.last_name,
            &self.membership,
            &self.password_changed,
        ]
        .into_iter()
        .map(String::as_str)
        .collect()
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// LDAP search scope for user entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchScope {
    /// Direct children of the users DN.
    OneLevel,
    /// The whole subtree.
    #[default]
    Subtree,
}

impl SearchScope {
    /// Converts to ldap3 scope.
    #[must_use]
    pub const fn to_ldap3(self) -> ldap3::Scope {
        match self {
            Self::OneLevel => ldap3::Scope::OneLevel,
            Self::Subtree => ldap3::Scope::Subtree,
        }
    }
}

/// Directory settings of one provider.
///
/// Built with [`LdapConfig::new`] plus field overrides, then checked with
/// [`LdapConfig::validate`]. The `connection_url` MUST use `ldaps://`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Server URL.
    pub connection_url: String,
    /// Service account DN.
    pub bind_dn: String,
    /// Service account password. Never serialized.
    #[serde(skip_serializing, default)]
    pub bind_credential: String,
    /// Verify the server certificate.
    pub validate_certificates: bool,

    /// Base DN of user entries.
    pub users_dn: String,
    /// Object classes a user entry must have.
    pub user_object_classes: Vec<String>,
    /// Base DN for group searches. When unset, groups come from the
    /// membership attribute only.
    pub groups_dn: Option<String>,
    /// Object class of group entries.
    pub group_object_class: String,
    /// Scope of user searches.
    pub search_scope: SearchScope,

    /// Vendor the defaults were taken from.
    pub vendor: LdapVendor,
    /// Attribute names.
    pub attributes: AttributeMapping,

    /// Connections open at once.
    pub pool_max_size: usize,
    /// Bound on acquiring a connection (slot wait, connect and bind).
    pub connection_timeout: Duration,
    /// Bound on a single search.
    pub read_timeout: Duration,
}

impl LdapConfig {
    /// Creates a configuration with generic schema defaults.
    #[must_use]
    pub fn new(
        connection_url: impl Into<String>,
        bind_dn: impl Into<String>,
        bind_credential: impl Into<String>,
        users_dn: impl Into<String>,
    ) -> Self {
        let vendor = LdapVendor::Other;
        Self {
            connection_url: connection_url.into(),
            bind_dn: bind_dn.into(),
            bind_credential: bind_credential.into(),
            validate_certificates: true,
            users_dn: users_dn.into(),
            user_object_classes: vec![vendor.user_object_class().to_string()],
            groups_dn: None,
            group_object_class: "groupOfNames".to_string(),
            search_scope: SearchScope::default(),
            vendor,
            attributes: AttributeMapping::for_vendor(vendor),
            pool_max_size: DEFAULT_POOL_SIZE,
            connection_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
        }
    }

    /// Switches vendor, resetting the object classes and attribute names
    /// to that vendor's defaults.
    #[must_use]
    pub fn with_vendor(mut self, vendor: LdapVendor) -> Self {
        self.vendor = vendor;
        self.user_object_classes = vec![vendor.user_object_class().to_string()];
        self.attributes = AttributeMapping::for_vendor(vendor);
        self
    }

    /// Builds the LDAP configuration of a federation provider.
    ///
    /// Vendor defaults apply first; explicit component keys override them.
    ///
    /// ## Errors
    ///
    /// Returns an error if a required key is missing, a value is invalid,
    /// or the URL is not LDAPS.
    pub fn from_provider(provider: &ProviderConfig) -> LdapResult<Self> {
        let require = |key: &str| {
            provider
                .get(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| LdapError::config(format!("{key} is required")))
        };

        let vendor = LdapVendor::from_id(provider.get(VENDOR).unwrap_or_default())?;
        let mut config = Self::new(
            require(keys::CONNECTION_URL)?,
            require(keys::BIND_DN)?,
            require(keys::BIND_CREDENTIAL)?,
            require(keys::USERS_DN)?,
        )
        .with_vendor(vendor);
        config.connection_timeout = provider.connection_timeout;
        config.read_timeout = provider.read_timeout;

        let overrides = [
            (keys::USERNAME_LDAP_ATTRIBUTE, &mut config.attributes.username),
            (keys::UUID_LDAP_ATTRIBUTE, &mut config.attributes.uuid),
            (MEMBERSHIP_ATTRIBUTE, &mut config.attributes.membership),
            (PASSWORD_CHANGED_ATTRIBUTE, &mut config.attributes.password_changed),
        ];
        for (key, slot) in overrides {
            if let Some(value) = provider.get(key).map(str::trim).filter(|v| !v.is_empty()) {
                *slot = value.to_string();
            }
        }

        if let Some(classes) = provider.get(keys::USER_OBJECT_CLASSES) {
            config.user_object_classes = classes
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        config.groups_dn = provider
            .get(keys::GROUPS_DN)
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string);
        if let Some(validate) = provider.get_bool(VALIDATE_CERTIFICATES) {
            config.validate_certificates = validate;
        }
        if let Some(size) = provider.get(CONNECTION_POOL_SIZE) {
            config.pool_max_size = size.trim().parse().map_err(|_| {
                LdapError::config(format!("{CONNECTION_POOL_SIZE}: expected a number"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration.
    ///
    /// ## Errors
    ///
    /// Returns [`LdapError::InsecureProtocol`] for anything but `ldaps://`
    /// and a configuration error for empty required values.
    pub fn validate(&self) -> LdapResult<()> {
        let host = self
            .connection_url
            .get(..8)
            .filter(|scheme| scheme.eq_ignore_ascii_case("ldaps://"))
            .map(|_| &self.connection_url[8..])
            .ok_or(LdapError::InsecureProtocol)?;
        if host.is_empty() {
            return Err(LdapError::config("connection URL has no host"));
        }

        let required = [
            ("bind DN", self.bind_dn.as_str()),
            ("users DN", self.users_dn.as_str()),
            ("username attribute", self.attributes.username.as_str()),
        ];
        if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(LdapError::config(format!("{name} cannot be empty")));
        }
        if self.user_object_classes.is_empty() {
            return Err(LdapError::config("at least one user object class is required"));
        }
        if self.pool_max_size == 0 {
            return Err(LdapError::config("connection pool size must be positive"));
        }
        Ok(())
    }

    /// Filter matching any user entry.
    #[must_use]
    pub fn user_search_filter(&self) -> String {
        let classes: String = self
            .user_object_classes
            .iter()
            .map(|c| format!("(objectClass={c})"))
            .collect();
        if self.user_object_classes.len() == 1 {
            classes
        } else {
            format!("(&{classes})")
        }
    }

    /// Filter matching the user entry of `username`.
    #[must_use]
    pub fn user_by_username_filter(&self, username: &str) -> String {
        format!(
            "(&{}({}={}))",
            self.user_search_filter(),
            self.attributes.username,
            ldap_escape(username)
        )
    }

    /// Filter matching the groups that list `member_dn`.
    #[must_use]
    pub fn groups_by_member_filter(&self, member_dn: &str) -> String {
        format!(
            "(&(objectClass={})(member={}))",
            self.group_object_class,
            ldap_escape(member_dn)
        )
    }
}

/// Escapes a filter assertion value (RFC 4515).
fn ldap_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\5c"),
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(c),
        }
    }
    escaped
}
