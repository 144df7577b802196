//! Configuration Loader
//!
//! Builds an [`MplpConfig`] from three layers, later layers winning:
//! built-in defaults, an optional TOML/YAML file, and `MPLP__` environment
//! variables. The merged result is validated before it is handed out.

use super::error::{ConfigResult, ConfigurationError};
use super::MplpConfig;
use crate::cache::ResultCache;
use crate::constants::ENV_PREFIX;
use crate::events::EventBus;
use crate::orchestration::{CoreOrchestrator, WorkflowResult};
use crate::registry::ModuleRegistry;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Loaded, validated configuration plus where it came from.
#[derive(Debug)]
pub struct ConfigManager {
    config: MplpConfig,
    environment: String,
    source_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load `path` over the defaults, then apply process environment overrides.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_env(Some(path.as_ref()), None)
    }

    /// Defaults plus process environment overrides, no file.
    pub fn load_defaults() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_env(None, None)
    }

    /// Load with an explicit environment map instead of the process environment.
    /// This is useful for testing without modifying global environment variables.
    pub fn load_with_env(
        path: Option<&Path>,
        env_overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        let config = Self::build_config(path, env_overrides)?;
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string(&config).unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            environment = %environment,
            source = %path.map(|p| p.display().to_string()).unwrap_or_else(|| "defaults".to_string()),
            "⚙️ CONFIG: Loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            source_path: path.map(Path::to_path_buf),
        }))
    }

    /// Wrap an already-built configuration after validating it.
    pub fn from_config(config: MplpConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            source_path: None,
        }))
    }

    fn build_config(
        path: Option<&Path>,
        env_overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<MplpConfig> {
        let defaults = Config::try_from(&MplpConfig::default())
            .map_err(|e| ConfigurationError::parse_error("defaults", e))?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigurationError::ConfigFileNotFound {
                    path: path.to_path_buf(),
                });
            }
            builder = builder.add_source(File::from(path).required(true));
        }

        let mut environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("orchestrator.required_modules")
            .with_list_parse_key("orchestrator.default_workflow.stages");
        if let Some(overrides) = env_overrides {
            environment = environment.source(Some(overrides.into_iter().collect()));
        }
        builder = builder.add_source(environment);

        let source_name = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());

        builder
            .build()
            .map_err(|e| ConfigurationError::parse_error(source_name.clone(), e))?
            .try_deserialize()
            .map_err(|e| ConfigurationError::parse_error(source_name, e))
    }

    /// `MPLP_ENV`, then `APP_ENV`, defaulting to `development`.
    pub fn detect_environment() -> String {
        env::var("MPLP_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    pub fn config(&self) -> &MplpConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Orchestrator with a fresh registry, event bus and (when enabled) result
    /// cache, all sized from this configuration.
    pub fn build_orchestrator(&self) -> CoreOrchestrator {
        let registry = Arc::new(ModuleRegistry::new());
        let event_bus = Arc::new(EventBus::new(self.config.event_bus.clone()));
        let cache = Arc::new(ResultCache::<WorkflowResult>::from_config(&self.config.cache));

        CoreOrchestrator::new(self.config.orchestrator.clone(), registry, event_bus)
            .with_cache(cache)
    }
}
