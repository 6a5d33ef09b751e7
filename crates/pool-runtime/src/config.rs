//! Application configuration loaded from YAML.

use pool_core::rules::ValidationRules;
use pool_econ::{MetricModelKind, PoolParams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// State store settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend key the whole state is saved under.
    pub storage_key: String,
    /// 0 disables auto-save.
    pub autosave_secs: u64,
    pub history_retention_days: i64,
    pub default_cache_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: "app_state".to_string(),
            autosave_secs: 30,
            history_retention_days: 7,
            default_cache_ttl_secs: 3600,
        }
    }
}

impl StoreConfig {
    pub fn autosave_period(&self) -> Option<Duration> {
        (self.autosave_secs > 0).then(|| Duration::from_secs(self.autosave_secs))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub validation: ValidationRules,
    pub pool: PoolParams,
    pub model: MetricModelKind,
    pub store: StoreConfig,
}

impl AppConfig {
    pub fn from_yaml(text: &str) -> Result<Self, AppConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| AppConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }
}
