//! Pipeline timing configuration
//!
//! Values are layered with figment: built-in defaults, then an optional
//! TOML/YAML/JSON file, then `STENCIL_`-prefixed environment variables
//! (`STENCIL_TICK_INTERVAL_MS=10`).

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "STENCIL_";

/// Default interval between expansion ticks, roughly one frame at 60 Hz
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 17;

/// Default time budget spent expanding within one tick
pub const DEFAULT_TICK_BUDGET_MS: u64 = 2;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Configuration file format not supported
    #[error("Unsupported configuration file format: {format}")]
    UnsupportedFormat { format: String },

    /// Configuration parsing failed
    #[error("Failed to parse configuration: {source}")]
    ParseError {
        #[source]
        source: Box<figment::Error>,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    Invalid { message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::ParseError {
            source: Box::new(error),
        }
    }
}

/// Timing knobs for the time-sliced expansion phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Milliseconds between expansion ticks
    pub tick_interval_ms: u64,
    /// Milliseconds of expansion work allowed per tick
    pub tick_budget_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            tick_budget_ms: DEFAULT_TICK_BUDGET_MS,
        }
    }
}

impl PipelineConfig {
    /// Load defaults overlaid with environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load defaults, then `file` if given, then environment variables
    pub fn load_from(file: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(file)?.extract()?;
        config.validate()?;
        debug!(
            tick_interval_ms = config.tick_interval_ms,
            tick_budget_ms = config.tick_budget_ms,
            "loaded pipeline configuration"
        );
        Ok(config)
    }

    /// Build the layered figment without extracting it
    pub fn figment(file: Option<&Path>) -> Result<Figment, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = file {
            if !path.is_file() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_default()
                .to_ascii_lowercase();
            figment = match extension.as_str() {
                "toml" => figment.merge(Toml::file(path)),
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                "json" => figment.merge(Json::file(path)),
                other => {
                    return Err(ConfigError::UnsupportedFormat {
                        format: other.to_string(),
                    })
                }
            };
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Reject configurations the scheduler cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                message: "tick_interval_ms must be greater than zero".to_string(),
            });
        }
        if self.tick_budget_ms > self.tick_interval_ms {
            return Err(ConfigError::Invalid {
                message: format!(
                    "tick_budget_ms ({}) must not exceed tick_interval_ms ({})",
                    self.tick_budget_ms, self.tick_interval_ms
                ),
            });
        }
        Ok(())
    }

    /// Interval between ticks
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Expansion budget per tick
    pub fn tick_budget(&self) -> Duration {
        Duration::from_millis(self.tick_budget_ms)
    }
}
