//! CLI configuration.

use std::path::{Path, PathBuf};

use kc_core::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

/// CLI configuration: where the engine configuration lives and what it holds.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Path the configuration was read from, if a file existed.
    pub path: Option<PathBuf>,

    /// Engine configuration.
    pub engine: EngineConfig,
}

impl CliConfig {
    /// Loads configuration.
    ///
    /// An explicit path must exist. Without one, the default path is used
    /// if present, and built-in defaults otherwise. `KC_*` environment
    /// overrides apply in both cases.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> CliResult<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Some(Self::default_path()?).filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                let engine = EngineConfig::load(&path)?;
                Ok(Self {
                    path: Some(path),
                    engine,
                })
            }
            None => {
                let _ = dotenvy::dotenv();
                let mut engine = EngineConfig::default();
                engine.apply_env(|key| std::env::var(key).ok())?;
                Ok(Self { path: None, engine })
            }
        }
    }

    /// Gets the default configuration file path.
    ///
    /// ## Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn default_path() -> CliResult<PathBuf> {
        let home = dirs_next::home_dir()
            .ok_or_else(|| CliError::Config("could not determine home directory".to_string()))?;
        Ok(home.join(".keycloak").join("kc.toml"))
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}
