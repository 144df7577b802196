//! # Module Contract
//!
//! The capability interface every business module exposes to the core.
//! The registry and orchestrator depend only on [`ProtocolModule`]; concrete
//! planning/confirmation/tracing modules live behind adapters (see
//! [`crate::coordinator`]).

pub mod descriptor;
pub mod version;

use crate::error::ModuleResult;
use crate::orchestration::types::ExecutionContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub use descriptor::{DescriptorInfo, ModuleDependency, ModuleDescriptor};
pub use version::{is_version_compatible, parse_version};

/// Self-reported module state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Initialized,
    Running,
    Idle,
    Error,
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModuleState::Initialized => "initialized",
            ModuleState::Running => "running",
            ModuleState::Idle => "idle",
            ModuleState::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub name: String,
    pub status: ModuleState,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub error_count: u64,
}

impl ModuleStatus {
    pub fn new(name: impl Into<String>, status: ModuleState) -> Self {
        Self {
            name: name.into(),
            status,
            last_execution_time: None,
            error_count: 0,
        }
    }
}

/// Input handed to a module for one stage attempt.
///
/// The cancellation token fires when the stage's per-module timeout or the
/// workflow timeout expires. Cancellation is cooperative: the orchestrator
/// stops waiting, but the module's future keeps running until it observes
/// the token or finishes on its own.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub stage: String,
    pub attempt: u32,
    pub execution: ExecutionContext,
    pub cancellation_token: CancellationToken,
}

impl StageContext {
    pub fn new(
        stage: impl Into<String>,
        attempt: u32,
        execution: ExecutionContext,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            stage: stage.into(),
            attempt,
            execution,
            cancellation_token,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Completes when the orchestrator gives up on this attempt.
    pub async fn cancelled(&self) {
        self.cancellation_token.cancelled().await
    }

    /// Output of an earlier stage in the same execution, if it has completed.
    pub fn stage_output(&self, stage: &str) -> Option<&Value> {
        self.execution
            .stage_result(stage)
            .and_then(|result| result.output.as_ref())
    }
}

/// Contract between the core and a business module.
#[async_trait]
pub trait ProtocolModule: Send + Sync {
    fn name(&self) -> &str;

    /// Fails with [`crate::error::ModuleError::Initialization`] when prerequisites are missing.
    async fn initialize(&self) -> ModuleResult<()>;

    async fn execute(&self, context: &StageContext) -> ModuleResult<Value>;

    async fn cleanup(&self) -> ModuleResult<()>;

    fn status(&self) -> ModuleStatus;

    /// Undo the effects of a completed stage after the workflow failed.
    async fn rollback(&self, _context: &StageContext) -> ModuleResult<()> {
        Ok(())
    }
}
