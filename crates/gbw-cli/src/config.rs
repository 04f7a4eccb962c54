use std::path::{Path, PathBuf};

use gbw_core::ConflictPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub conversion: ConversionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ConversionConfig {
    pub conflict_policy: ConflictPolicy,
}

/// The audit log stays off unless a config file turns it on. Without `file`
/// the log goes to the per-user state directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
    pub max_bytes: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "off".to_owned(),
            file: None,
            max_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, error: std::io::Error },
    Parse { path: PathBuf, error: toml::de::Error },
}

/// Only an explicitly named file is read; `None` and a missing file both
/// yield the defaults.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let Some(config_path) = path.map(Path::to_path_buf) else {
        return Ok(AppConfig::default());
    };

    if !config_path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = std::fs::read_to_string(&config_path).map_err(|error| ConfigError::Io {
        path: config_path.clone(),
        error,
    })?;
    toml::from_str::<AppConfig>(&raw).map_err(|error| ConfigError::Parse {
        path: config_path,
        error,
    })
}
