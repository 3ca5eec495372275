//! Bridge configuration loading.
//!
//! Values come from `ENGINE_BRIDGE_*` environment variables with sensible
//! defaults; invalid values fall back to defaults without failing. A TOML
//! file with a `[bridge]` table can supply the same settings, and there
//! invalid values are reported.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `ENGINE_BRIDGE_LOG_LEVEL` | info | Tracing filter directive |
//! | `ENGINE_BRIDGE_LOG_FORMAT` | json | `json` or `pretty` |
//! | `ENGINE_BRIDGE_LOG_FILE` | (stderr) | Log output file |
//! | `ENGINE_BRIDGE_MAX_HANDLES` | 65536 | Max live engine handles (floor 16) |

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::telemetry::{LogConfig, LogFormat};

const DEFAULT_MAX_HANDLES: usize = 65_536;
const MIN_MAX_HANDLES: usize = 16;

/// All bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub log: LogConfig,
    /// Capacity of the handle registry.
    pub max_handles: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            max_handles: DEFAULT_MAX_HANDLES,
        }
    }
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub log_level: String,
    pub log_format: &'static str,
    pub log_file: Option<PathBuf>,
    pub max_handles: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

fn load_log_config() -> LogConfig {
    let defaults = LogConfig::default();
    let level = std::env::var("ENGINE_BRIDGE_LOG_LEVEL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(defaults.level);
    let format = std::env::var("ENGINE_BRIDGE_LOG_FORMAT")
        .ok()
        .and_then(|v| LogFormat::parse(&v))
        .unwrap_or(defaults.format);
    let output_path = std::env::var("ENGINE_BRIDGE_LOG_FILE")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);
    LogConfig { format, level, output_path }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> BridgeConfig {
    let max_handles = parse_usize("ENGINE_BRIDGE_MAX_HANDLES", DEFAULT_MAX_HANDLES);
    BridgeConfig {
        log: load_log_config(),
        max_handles: max_handles.max(MIN_MAX_HANDLES),
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    bridge: FileSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSection {
    log_level: Option<String>,
    log_format: Option<String>,
    log_file: Option<PathBuf>,
    max_handles: Option<usize>,
}

/// Parse configuration from TOML. Keys left out keep their defaults.
pub fn from_toml_str(source: &str) -> Result<BridgeConfig, ConfigError> {
    let file: FileConfig = toml::from_str(source)?;
    let section = file.bridge;
    let mut config = BridgeConfig::default();

    if let Some(level) = section.log_level {
        config.log.level = level;
    }
    if let Some(format) = section.log_format {
        config.log.format = LogFormat::parse(&format).ok_or(ConfigError::InvalidValue {
            key: "log_format",
            value: format.clone(),
        })?;
    }
    config.log.output_path = section.log_file;
    if let Some(max) = section.max_handles {
        if max < MIN_MAX_HANDLES {
            return Err(ConfigError::InvalidValue {
                key: "max_handles",
                value: max.to_string(),
            });
        }
        config.max_handles = max;
    }
    Ok(config)
}

impl BridgeConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            log_level: self.log.level.clone(),
            log_format: self.log.format.as_str(),
            log_file: self.log.output_path.clone(),
            max_handles: self.max_handles,
        }
    }
}
