//! Configuration
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. A TOML file: `--config`/`LOOPSCOPE_CONFIG_PATH` (must exist), otherwise
//!    `loopscope.toml` in the working directory if present
//! 3. `LOOPSCOPE_*` environment variables
//! 4. Values set on [`ConfigBuilder`]

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_PREFIX: &str = "LOOPSCOPE";
pub const CONFIG_PATH_VAR: &str = "LOOPSCOPE_CONFIG_PATH";
const DEFAULT_FILE: &str = "loopscope";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Delay between instructions in `run()`, in milliseconds
    pub step_delay_ms: u64,
    /// Deepest allowed call nesting before a run halts
    pub max_call_depth: usize,
    /// `tracing` filter used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            step_delay_ms: 500,
            max_call_depth: 256,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load from the default sources, honoring `LOOPSCOPE_CONFIG_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Self::builder();
        if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
            builder = builder.config_path(path);
        }
        builder.build()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::Invalid("max_call_depth must be at least 1".into()));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid("log_filter must not be empty".into()));
        }
        Ok(self)
    }
}

/// Layered configuration with per-field overrides
#[derive(Debug, Default, Clone)]
pub struct ConfigBuilder {
    config_path: Option<String>,
    step_delay_ms: Option<u64>,
    max_call_depth: Option<usize>,
    log_filter: Option<String>,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: impl Into<String>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn step_delay_ms(mut self, ms: u64) -> Self {
        self.step_delay_ms = Some(ms);
        self
    }

    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = Some(depth);
        self
    }

    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        let defaults = Config::default();
        let file = match &self.config_path {
            Some(path) => config::File::with_name(path).required(true),
            None => config::File::with_name(DEFAULT_FILE).required(false),
        };

        let mut builder = config::Config::builder()
            .set_default("step_delay_ms", defaults.step_delay_ms)?
            .set_default("max_call_depth", defaults.max_call_depth as u64)?
            .set_default("log_filter", defaults.log_filter)?
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        if let Some(ms) = self.step_delay_ms {
            builder = builder.set_override("step_delay_ms", ms)?;
        }
        if let Some(depth) = self.max_call_depth {
            builder = builder.set_override("max_call_depth", depth as u64)?;
        }
        if let Some(filter) = self.log_filter {
            builder = builder.set_override("log_filter", filter)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("loopscope-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = Config::builder().build().unwrap();
        assert_eq!(config.step_delay_ms, 500);
        assert_eq!(config.max_call_depth, 256);
    }

    #[test]
    fn test_file_then_overrides() {
        let path = write_temp("step_delay_ms = 40\nmax_call_depth = 12\n");

        let config = Config::builder()
            .config_path(path.to_string_lossy())
            .max_call_depth(8)
            .build()
            .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.step_delay_ms, 40);
        assert_eq!(config.max_call_depth, 8);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Config::builder()
            .config_path("/definitely/not/here/loopscope.toml")
            .build();
        assert!(matches!(result, Err(ConfigError::Source(_))));
    }

    #[test]
    fn test_validation() {
        let result = Config::builder().max_call_depth(0).build();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = Config::builder().log_filter("  ").build();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
