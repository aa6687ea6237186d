//! Typed provider settings.
//!
//! A [`ProviderConfig`] is the typed form of a registered provider
//! component. It is immutable once built; administrative changes replace the
//! whole provider.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use kc_core::{EngineConfig, ProviderComponent};
use kc_federation_kerberos::{KeytabSource, PrincipalName, ServiceCredential};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FederationError, FederationResult};
use crate::realm::RealmPolicy;

/// Component config keys, as used by the admin console.
pub mod keys {
    /// LDAP server URL.
    pub const CONNECTION_URL: &str = "connectionUrl";
    /// Bind DN.
    pub const BIND_DN: &str = "bindDn";
    /// Bind password.
    pub const BIND_CREDENTIAL: &str = "bindCredential";
    /// Base DN for user searches.
    pub const USERS_DN: &str = "usersDn";
    /// Attribute holding the username.
    pub const USERNAME_LDAP_ATTRIBUTE: &str = "usernameLDAPAttribute";
    /// Attribute holding the stable entry id.
    pub const UUID_LDAP_ATTRIBUTE: &str = "uuidLDAPAttribute";
    /// Comma-separated user object classes.
    pub const USER_OBJECT_CLASSES: &str = "userObjectClasses";
    /// Base DN for group searches.
    pub const GROUPS_DN: &str = "groupsDn";
    /// Edit mode.
    pub const EDIT_MODE: &str = "editMode";
    /// Whether the local password policy is enforced on login.
    pub const VALIDATE_PASSWORD_POLICY: &str = "validatePasswordPolicy";
    /// Whether directory emails are marked verified.
    pub const TRUST_EMAIL: &str = "trustEmail";
    /// Whether this provider accepts Kerberos tickets.
    pub const ALLOW_KERBEROS_AUTHENTICATION: &str = "allowKerberosAuthentication";
    /// Realm of the service principal.
    pub const KERBEROS_REALM: &str = "kerberosRealm";
    /// Realm tickets must come from (empty = any).
    pub const EXPECTED_REALM: &str = "expectedRealm";
    /// Service principal, e.g. `HTTP/localhost@KEYCLOAK.ORG`.
    pub const SERVER_PRINCIPAL: &str = "serverPrincipal";
    /// Path to the service keytab.
    pub const KEY_TAB: &str = "keyTab";
    /// Clock skew in seconds.
    pub const CLOCK_SKEW: &str = "clockSkew";
    /// Directory lookup timeout in milliseconds.
    pub const LOOKUP_TIMEOUT: &str = "lookupTimeout";
    /// LDAP connection timeout in milliseconds.
    pub const CONNECTION_TIMEOUT: &str = "connectionTimeout";
    /// LDAP read timeout in milliseconds.
    pub const READ_TIMEOUT: &str = "readTimeout";
    /// Whether the provider is enabled.
    pub const ENABLED: &str = "enabled";
}

/// Edit mode for federated users.
///
/// Controls how a later login refreshes the local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditMode {
    /// The directory is authoritative; local values are refreshed on every login.
    #[default]
    ReadOnly,

    /// The directory is authoritative and accepts write-back.
    Writable,

    /// Imported once; local edits are kept and only empty values are filled.
    Unsynced,
}

impl EditMode {
    /// True if a login overwrites local values with directory values.
    ///
    /// `ReadOnly` and `Writable` behave the same on login. They differ only
    /// in whether local edits may be written back to the directory, which
    /// this engine never does.
    #[must_use]
    pub const fn refreshes_from_directory(self) -> bool {
        !matches!(self, Self::Unsynced)
    }
}

impl FromStr for EditMode {
    type Err = FederationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "READ_ONLY" => Ok(Self::ReadOnly),
            "WRITABLE" => Ok(Self::Writable),
            "UNSYNCED" => Ok(Self::Unsynced),
            other => Err(FederationError::config(format!("unknown edit mode '{other}'"))),
        }
    }
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadOnly => "READ_ONLY",
            Self::Writable => "WRITABLE",
            Self::Unsynced => "UNSYNCED",
        })
    }
}

/// Kerberos settings of a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KerberosSettings {
    /// Realm of the service principal.
    pub kerberos_realm: String,
    /// Which ticket realms this provider accepts.
    pub realm_policy: RealmPolicy,
    /// Service principal and keytab.
    pub credential: ServiceCredential,
    /// Tolerated clock skew.
    pub clock_skew: Duration,
}

/// Typed configuration of a user storage provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Component id.
    pub id: Uuid,
    /// Realm served by the engine.
    pub realm_id: Uuid,
    /// Registry key, also stored as the user's federation link.
    pub name: String,
    /// Factory id, e.g. `ldap`.
    pub provider_type: String,
    /// Dispatch order among wildcard providers; lower goes first.
    pub priority: i32,
    /// Disabled providers stay registered but are skipped.
    pub enabled: bool,
    /// How later logins refresh imported users.
    pub edit_mode: EditMode,

    /// Whether the local password policy is checked on login.
    pub validate_password_policy: bool,

    /// Whether directory emails are marked verified.
    pub trust_email: bool,

    /// Kerberos settings; `None` when Kerberos authentication is off.
    pub kerberos: Option<KerberosSettings>,

    /// Upper bound for one directory lookup.
    pub lookup_timeout: Duration,

    /// LDAP connect-and-bind bound.
    pub connection_timeout: Duration,

    /// LDAP per-search bound.
    pub read_timeout: Duration,

    /// Keys not consumed above, passed to the provider factory.
    pub config: BTreeMap<String, String>,
}

impl ProviderConfig {
    /// Starts an enabled configuration with default timeouts.
    #[must_use]
    pub fn builder() -> ProviderConfigBuilder {
        ProviderConfigBuilder::new()
    }

    /// Raw factory setting.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    /// Factory setting parsed as `true`/`false`; unparsable values read as absent.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.config.get(key).and_then(|v| v.parse().ok())
    }

    /// Returns the realm policy. Providers without Kerberos accept no realm
    /// restriction, but are never consulted for tickets.
    #[must_use]
    pub fn realm_policy(&self) -> RealmPolicy {
        self.kerberos
            .as_ref()
            .map_or_else(RealmPolicy::any, |k| k.realm_policy.clone())
    }

    /// Returns true if the dispatcher should consult this provider.
    #[must_use]
    pub const fn accepts_tickets(&self) -> bool {
        self.enabled && self.kerberos.is_some()
    }

    /// Builds a typed configuration from an admin component.
    ///
    /// Timeouts and clock skew fall back to `defaults`.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if a value is missing or cannot be
    /// parsed.
    pub fn from_component(
        component: &ProviderComponent,
        realm_id: Uuid,
        defaults: &EngineConfig,
    ) -> FederationResult<Self> {
        let bool_key = |key: &str, default: bool| -> FederationResult<bool> {
            component.get(key).map_or(Ok(default), |v| {
                v.trim()
                    .parse()
                    .map_err(|_| FederationError::config(format!("{key}: expected true or false")))
            })
        };
        let millis_key = |key: &str, default: u64| -> FederationResult<Duration> {
            component.get(key).map_or(Ok(Duration::from_millis(default)), |v| {
                v.trim()
                    .parse()
                    .map(Duration::from_millis)
                    .map_err(|_| FederationError::config(format!("{key}: expected milliseconds")))
            })
        };

        let mut builder = Self::builder()
            .realm_id(realm_id)
            .name(&component.name)
            .provider_type(&component.provider_id)
            .priority(component.priority)
            .enabled(bool_key(keys::ENABLED, true)?)
            .validate_password_policy(bool_key(keys::VALIDATE_PASSWORD_POLICY, false)?)
            .trust_email(bool_key(keys::TRUST_EMAIL, false)?)
            .lookup_timeout(millis_key(
                keys::LOOKUP_TIMEOUT,
                defaults.directory.lookup_timeout_ms,
            )?)
            .connection_timeout(millis_key(keys::CONNECTION_TIMEOUT, 5_000)?)
            .read_timeout(millis_key(keys::READ_TIMEOUT, 30_000)?);

        if let Some(mode) = component.get(keys::EDIT_MODE) {
            builder = builder.edit_mode(mode.parse()?);
        }

        if bool_key(keys::ALLOW_KERBEROS_AUTHENTICATION, true)? {
            let kerberos_realm = component
                .get(keys::KERBEROS_REALM)
                .filter(|r| !r.is_empty())
                .ok_or_else(|| FederationError::config("kerberosRealm is required"))?;
            let principal = component
                .get(keys::SERVER_PRINCIPAL)
                .ok_or_else(|| FederationError::config("serverPrincipal is required"))?;
            let principal = PrincipalName::parse_with_default_realm(principal, kerberos_realm)
                .map_err(|e| FederationError::config(format!("serverPrincipal: {e}")))?;
            let keytab = component
                .get(keys::KEY_TAB)
                .filter(|k| !k.is_empty())
                .ok_or_else(|| FederationError::config("keyTab is required"))?;
            let skew = match component.get(keys::CLOCK_SKEW) {
                Some(v) => v
                    .trim()
                    .parse()
                    .map_err(|_| FederationError::config("clockSkew: expected seconds"))?,
                None => defaults.kerberos.clock_skew_secs,
            };

            builder = builder.kerberos(KerberosSettings {
                kerberos_realm: kerberos_realm.to_string(),
                realm_policy: RealmPolicy::new(component.get(keys::EXPECTED_REALM)),
                credential: ServiceCredential::new(
                    principal,
                    KeytabSource::File(PathBuf::from(keytab)),
                ),
                clock_skew: Duration::from_secs(skew),
            });
        }

        const TYPED_KEYS: &[&str] = &[
            keys::ENABLED,
            keys::VALIDATE_PASSWORD_POLICY,
            keys::TRUST_EMAIL,
            keys::LOOKUP_TIMEOUT,
            keys::CONNECTION_TIMEOUT,
            keys::READ_TIMEOUT,
            keys::EDIT_MODE,
            keys::ALLOW_KERBEROS_AUTHENTICATION,
            keys::KERBEROS_REALM,
            keys::SERVER_PRINCIPAL,
            keys::KEY_TAB,
            keys::CLOCK_SKEW,
            keys::EXPECTED_REALM,
        ];
        for (key, value) in &component.config {
            if !TYPED_KEYS.contains(&key.as_str()) {
                builder = builder.config(key, value);
            }
        }

        builder.build()
    }
}

/// Builder for [`ProviderConfig`].
#[derive(Debug, Default)]
pub struct ProviderConfigBuilder {
    id: Option<Uuid>,
    realm_id: Option<Uuid>,
    provider_type: Option<String>,
    name: Option<String>,
    priority: i32,
    enabled: bool,
    edit_mode: EditMode,
    validate_password_policy: bool,
    trust_email: bool,
    kerberos: Option<KerberosSettings>,
    lookup_timeout: Duration,
    connection_timeout: Duration,
    read_timeout: Duration,
    config: BTreeMap<String, String>,
}

impl ProviderConfigBuilder {
    /// See [`ProviderConfig::builder`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            lookup_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// Keeps the component id instead of minting one.
    #[must_use]
    pub const fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Required.
    #[must_use]
    pub const fn realm_id(mut self, realm_id: Uuid) -> Self {
        self.realm_id = Some(realm_id);
        self
    }

    /// Required.
    #[must_use]
    pub fn provider_type(mut self, provider_type: impl Into<String>) -> Self {
        self.provider_type = Some(provider_type.into());
        self
    }

    /// Required; blank names are rejected.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Defaults to 0.
    #[must_use]
    pub const fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Defaults to enabled.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Defaults to [`EditMode::ReadOnly`].
    #[must_use]
    pub const fn edit_mode(mut self, mode: EditMode) -> Self {
        self.edit_mode = mode;
        self
    }

    /// Sets whether the password policy is validated on login.
    #[must_use]
    pub const fn validate_password_policy(mut self, validate: bool) -> Self {
        self.validate_password_policy = validate;
        self
    }

    /// Sets whether directory emails are trusted.
    #[must_use]
    pub const fn trust_email(mut self, trust: bool) -> Self {
        self.trust_email = trust;
        self
    }

    /// Sets the Kerberos settings.
    #[must_use]
    pub fn kerberos(mut self, kerberos: KerberosSettings) -> Self {
        self.kerberos = Some(kerberos);
        self
    }

    /// Sets the directory lookup timeout.
    #[must_use]
    pub const fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Defaults to 5 seconds.
    #[must_use]
    pub const fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Defaults to 30 seconds.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Adds a factory setting.
    #[must_use]
    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Validates and freezes the configuration.
    ///
    /// ## Errors
    ///
    /// Returns a configuration error if the realm, name or type is missing,
    /// or the lookup timeout is zero.
    pub fn build(self) -> FederationResult<ProviderConfig> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| FederationError::config("provider name is required"))?;
        let realm_id = self
            .realm_id
            .ok_or_else(|| FederationError::config("realm_id is required"))?;
        let provider_type = self
            .provider_type
            .ok_or_else(|| FederationError::config("provider_type is required"))?;
        if self.lookup_timeout.is_zero() {
            return Err(FederationError::config("lookup timeout must be positive"));
        }

        Ok(ProviderConfig {
            id: self.id.unwrap_or_else(Uuid::now_v7),
            realm_id,
            name,
            provider_type,
            priority: self.priority,
            enabled: self.enabled,
            edit_mode: self.edit_mode,
            validate_password_policy: self.validate_password_policy,
            trust_email: self.trust_email,
            kerberos: self.kerberos,
            lookup_timeout: self.lookup_timeout,
            connection_timeout: self.connection_timeout,
            read_timeout: self.read_timeout,
            config: self.config,
        })
    }
}
