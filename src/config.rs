//! Configuration file loading.
//!
//! The configuration is a YAML document. `${VAR}` placeholders anywhere in
//! the file are replaced from the process environment before parsing, so
//! credentials can stay out of the file.

use datasync_mongodb::MongoConfig;
use datasync_postgresql::PostgresConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use sync_core::TableMapping;
use thiserror::Error;

use crate::engine::{EngineSettings, SyncDirection};
use crate::resolver::ConflictStrategy;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "DATASYNC_CONFIG";

/// Configuration file used when neither `--config` nor the environment names one.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("environment variable '{0}' referenced in config is not set")]
    MissingVar(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_batch_size() -> usize {
    1000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_seconds() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Settings of the sync loop itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between cycles; `0` runs a single cycle.
    #[serde(default, alias = "interval")]
    pub interval_seconds: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub direction: SyncDirection,

    #[serde(default)]
    pub conflict_resolution: ConflictStrategy,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,

    /// Table/collection pairs. Empty means discover every table.
    #[serde(default, alias = "tables")]
    pub mappings: Vec<TableMapping>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 0,
            batch_size: default_batch_size(),
            direction: SyncDirection::default(),
            conflict_resolution: ConflictStrategy::default(),
            retry_attempts: default_retry_attempts(),
            retry_delay_seconds: default_retry_delay_seconds(),
            mappings: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            batch_size: self.batch_size,
            direction: self.direction,
            conflict_strategy: self.conflict_resolution,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default, alias = "postgres")]
    pub postgresql: PostgresConfig,

    #[serde(default, alias = "mongo")]
    pub mongodb: MongoConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a configuration document, substituting `${VAR}` placeholders first.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let expanded = substitute_env(text, |name| std::env::var(name).ok())?;
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "sync.batch_size must be at least 1".into(),
            ));
        }
        for (i, mapping) in self.sync.mappings.iter().enumerate() {
            if mapping.relational_table.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "sync.mappings[{i}]: relational_table is empty"
                )));
            }
            if mapping.document_collection.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "sync.mappings[{i}]: document_collection is empty"
                )));
            }
            if mapping.primary_key.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "sync.mappings[{i}]: primary_key is empty"
                )));
            }
        }
        Ok(())
    }
}

/// Pick the configuration file: explicit path, then [`CONFIG_ENV_VAR`], then
/// [`DEFAULT_CONFIG_PATH`].
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Replace every `${NAME}` in `text` with `lookup(NAME)`.
///
/// A `$` not followed by `{` is left alone, as is an unterminated `${`.
pub fn substitute_env<F>(text: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        let value = lookup(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()))?;
        out.push_str(&rest[..start]);
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
