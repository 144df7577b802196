//! # Orchestrator Configuration
//!
//! ```yaml
//! orchestrator:
//!   module_timeout_ms: 10000
//!   max_concurrent_executions: 100
//!   enable_event_logging: true
//!   cache_enabled: true
//!   required_modules: [context, plan]
//!   default_workflow:
//!     stages: [plan, confirm, trace]
//!     execution_mode: sequential
//!     timeout_ms: 30000
//! ```

use super::types::WorkflowConfiguration;
use crate::constants::defaults;
use crate::error::{OrchestrationError, OrchestrationResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Per-attempt limit for a single module `execute` call
    pub module_timeout_ms: u64,
    pub max_concurrent_executions: usize,
    pub enable_event_logging: bool,
    pub cache_enabled: bool,
    pub default_workflow: WorkflowConfiguration,
    /// Modules that must be registered before `initialize` succeeds
    pub required_modules: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            module_timeout_ms: defaults::MODULE_TIMEOUT_MS,
            max_concurrent_executions: defaults::MAX_CONCURRENT_EXECUTIONS,
            enable_event_logging: true,
            cache_enabled: true,
            default_workflow: WorkflowConfiguration::default(),
            required_modules: Vec::new(),
        }
    }
}

impl OrchestratorConfig {
    pub fn module_timeout(&self) -> Duration {
        Duration::from_millis(self.module_timeout_ms)
    }

    pub fn validate(&self) -> OrchestrationResult<()> {
        if self.module_timeout_ms == 0 {
            return Err(OrchestrationError::InvalidConfiguration {
                field: "module_timeout_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_concurrent_executions == 0 {
            return Err(OrchestrationError::InvalidConfiguration {
                field: "max_concurrent_executions".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        self.default_workflow.validate()
    }
}
