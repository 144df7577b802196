//! # Orchestration Engine
//!
//! Workflow execution over registered protocol modules.
//!
//! ## Core Components
//!
//! - **CoreOrchestrator**: owns per-execution state and runs stages with timeout, retry and error-handling policy
//! - **WorkflowConfiguration**: stage list, execution mode, timeout, retry and error-handling policy
//! - **RetryPolicy**: exponential backoff shared with the event bus
//! - **WorkflowHooks**: observation points around workflows and stages

pub mod backoff;
pub mod config;
pub mod core_orchestrator;
pub mod hooks;
pub mod types;

pub use backoff::RetryPolicy;
pub use config::OrchestratorConfig;
pub use core_orchestrator::CoreOrchestrator;
pub use hooks::{NoopHooks, WorkflowHooks};
pub use types::{
    ErrorHandlingPolicy, ExecutionContext, ExecutionMode, ExecutionStatus, RunningStage, StageResult,
    StageStatus, WorkflowConfigOverride, WorkflowConfiguration, WorkflowResult, WorkflowStatus,
};
