//! # MPLP Configuration System
//!
//! Layered configuration for the orchestration core: built-in defaults, an
//! optional TOML/YAML file, then `MPLP__`-prefixed environment variables
//! (`__` separates nesting levels, e.g. `MPLP__CACHE__TTL_SECONDS=60`).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mplp_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load("config/mplp.yaml")?;
//! let timeout = manager.config().orchestrator.module_timeout_ms;
//! let orchestrator = manager.build_orchestrator();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::cache::CacheConfig;
use crate::error::OrchestrationError;
use crate::events::EventBusConfig;
use crate::orchestration::OrchestratorConfig;
use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MplpConfig {
    pub orchestrator: OrchestratorConfig,
    pub cache: CacheConfig,
    pub event_bus: EventBusConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive such as `info` or `mplp_core=debug`. Unset means
    /// environment-derived (`info` in production, `debug` elsewhere).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    pub format: LogFormat,
}

impl MplpConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.orchestrator.validate().map_err(|e| match e {
            OrchestrationError::InvalidConfiguration { field, reason } => {
                ConfigurationError::validation_error(format!("orchestrator.{field}: {reason}"))
            }
            other => ConfigurationError::validation_error(other),
        })?;

        if self.cache.capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.capacity",
                "0",
                "cache capacity must be greater than 0",
            ));
        }
        if self.cache.ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.ttl_seconds",
                "0",
                "cache TTL must be greater than 0",
            ));
        }

        if self.event_bus.enable_history && self.event_bus.history_limit == 0 {
            return Err(ConfigurationError::invalid_value(
                "event_bus.history_limit",
                "0",
                "history limit must be greater than 0 when history is enabled",
            ));
        }
        if self.event_bus.retry_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "event_bus.retry_interval_ms",
                "0",
                "retry interval must be greater than 0",
            ));
        }
        let multiplier = self.event_bus.retry_policy.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "event_bus.retry_policy.backoff_multiplier",
                multiplier.to_string(),
                "multiplier must be at least 1.0",
            ));
        }

        if let Some(level) = &self.logging.level {
            if level.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "logging.level",
                    "logging configuration (omit the field for the environment default)",
                ));
            }
        }

        Ok(())
    }
}
