//! Configuration management for the federation engine.
//!
//! Configuration is loaded from a TOML file and then overridden by `KC_*`
//! environment variables (a `.env` file is honoured when present).
//!
//! ```toml
//! password_policy = "length(8) and digits(1)"
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [[provider]]
//! name = "kerberos-groupA"
//! provider_id = "ldap"
//! priority = 0
//! [provider.config]
//! connectionUrl = "ldaps://ldap.keycloak.org:636"
//! kerberosRealm = "KEYCLOAK.ORG"
//! expectedRealm = "KEYCLOAK.ORG"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding the log filter.
pub const ENV_LOG_LEVEL: &str = "KC_LOG_LEVEL";
/// Environment variable overriding the log format (`pretty` or `json`).
pub const ENV_LOG_FORMAT: &str = "KC_LOG_FORMAT";
/// Environment variable overriding the Kerberos clock skew in seconds.
pub const ENV_CLOCK_SKEW_SECS: &str = "KC_CLOCK_SKEW_SECS";
/// Environment variable overriding the default directory lookup timeout.
pub const ENV_LOOKUP_TIMEOUT_MS: &str = "KC_LOOKUP_TIMEOUT_MS";
/// Environment variable overriding the local password policy.
pub const ENV_PASSWORD_POLICY: &str = "KC_PASSWORD_POLICY";

/// Main configuration structure for the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Kerberos acceptor defaults.
    pub kerberos: KerberosDefaults,
    /// Directory lookup defaults.
    pub directory: DirectoryDefaults,
    /// Local password policy in Keycloak policy syntax (empty = no policy).
    pub password_policy: String,
    /// Configured user storage providers.
    #[serde(rename = "provider")]
    pub providers: Vec<ProviderComponent>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Kerberos acceptor defaults, applied when a provider does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KerberosDefaults {
    /// Maximum tolerated clock difference between issuer and acceptor.
    pub clock_skew_secs: u64,
}

impl Default for KerberosDefaults {
    fn default() -> Self {
        Self {
            clock_skew_secs: 300,
        }
    }
}

/// Directory lookup defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryDefaults {
    /// Upper bound for a single directory lookup, in milliseconds.
    pub lookup_timeout_ms: u64,
}

impl Default for DirectoryDefaults {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 5000,
        }
    }
}

/// A provider as registered through the administrative interface.
///
/// This is the transport-neutral representation; `kc-federation` turns it
/// into a typed provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderComponent {
    /// Unique provider name.
    pub name: String,
    /// Provider type identifier (e.g. `ldap`).
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    /// Priority, lower values are tried first.
    #[serde(default)]
    pub priority: i32,
    /// Provider-specific configuration.
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

fn default_provider_id() -> String {
    "ldap".to_string()
}

impl ProviderComponent {
    /// Creates a new component.
    #[must_use]
    pub fn new(name: impl Into<String>, provider_id: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            provider_id: provider_id.into(),
            priority,
            config: BTreeMap::new(),
        }
    }

    /// Adds a config value.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Gets a config value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }
}

impl EngineConfig {
    /// Loads configuration from a TOML file, then applies environment overrides.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        // .env is optional
        let _ = dotenvy::dotenv();

        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string without environment overrides.
    ///
    /// ## Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("failed to parse config: {e}")))
    }

    /// Applies `KC_*` overrides using the given variable lookup.
    ///
    /// ## Errors
    ///
    /// Returns an error if a numeric or enum override cannot be parsed.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }

        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = match format.to_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                other => {
                    return Err(Error::config(format!(
                        "{ENV_LOG_FORMAT}: unknown log format '{other}'"
                    )))
                }
            };
        }

        if let Some(skew) = lookup(ENV_CLOCK_SKEW_SECS) {
            self.kerberos.clock_skew_secs = skew
                .parse()
                .map_err(|_| Error::config(format!("{ENV_CLOCK_SKEW_SECS}: not a number")))?;
        }

        if let Some(timeout) = lookup(ENV_LOOKUP_TIMEOUT_MS) {
            self.directory.lookup_timeout_ms = timeout
                .parse()
                .map_err(|_| Error::config(format!("{ENV_LOOKUP_TIMEOUT_MS}: not a number")))?;
        }

        if let Some(policy) = lookup(ENV_PASSWORD_POLICY) {
            self.password_policy = policy;
        }

        Ok(())
    }

    /// Validates the configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if provider names are empty or duplicated, or if the
    /// lookup timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.directory.lookup_timeout_ms == 0 {
            return Err(Error::config("directory.lookup_timeout_ms must be positive"));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(Error::config("provider name cannot be empty"));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(Error::config(format!(
                    "duplicate provider name '{}'",
                    provider.name
                )));
            }
        }

        Ok(())
    }
}
