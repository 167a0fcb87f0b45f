//! Configuration management for modresolve
//!
//! Handles configuration loading, validation, and environment overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::utils::{env_bool, env_int, env_opt};

/// Upper bound for the batch delay, in milliseconds
pub const MAX_BATCH_DELAY_MS: u64 = 60_000;

/// Environment variable overriding `ignore_warnings`
pub const ENV_IGNORE_WARNINGS: &str = "MODRESOLVE_IGNORE_WARNINGS";
/// Environment variable overriding `batch_delay_ms`
pub const ENV_BATCH_DELAY_MS: &str = "MODRESOLVE_BATCH_DELAY_MS";

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "modresolve=debug"); RUST_LOG takes precedence
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON log lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Silence cycle and unresolved-prerequisite diagnostics
    #[serde(default)]
    pub ignore_warnings: bool,

    /// Delay before a deferred pass runs (0 = next scheduler tick)
    #[serde(default)]
    pub batch_delay_ms: u64,

    /// Deliver initializer failures to the armed error callback
    #[serde(default = "default_true")]
    pub surface_errors: bool,

    /// Logging configuration
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

fn default_true() -> bool {
    true
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            ignore_warnings: false,
            batch_delay_ms: 0,
            surface_errors: true,
            logging: None,
        }
    }
}

impl LoaderConfig {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LoaderConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LoaderConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from JSON or TOML depending on the file extension
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            Some("toml") => Self::from_toml_file(path),
            other => Err(anyhow::anyhow!(
                "Unsupported config format {:?} for {}",
                other,
                path.display()
            )),
        }
    }

    /// Apply `MODRESOLVE_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if env_opt(ENV_IGNORE_WARNINGS).is_some() {
            self.ignore_warnings = env_bool(ENV_IGNORE_WARNINGS);
        }
        if let Some(delay) = env_int::<u64>(ENV_BATCH_DELAY_MS) {
            self.batch_delay_ms = delay;
        }
        self
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_delay_ms > MAX_BATCH_DELAY_MS {
            return Err(anyhow::anyhow!(
                "batch_delay_ms must be at most {} (got {})",
                MAX_BATCH_DELAY_MS,
                self.batch_delay_ms
            ));
        }

        if let Some(ref logging) = self.logging {
            if logging.filter.as_deref().is_some_and(|f| f.trim().is_empty()) {
                return Err(anyhow::anyhow!("logging.filter cannot be empty"));
            }
        }

        Ok(())
    }
}
