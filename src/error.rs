//! Error types for the MPLP core.
//!
//! Each subsystem owns a focused error enum; all of them convert into the
//! top-level [`MplpError`]. Stage-level failures are *captured* into stage
//! results as [`ErrorInfo`] instead of being thrown out of a workflow call.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use crate::config::ConfigurationError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MplpError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),
    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

pub type MplpResult<T> = std::result::Result<T, MplpError>;
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
pub type OrchestrationResult<T> = std::result::Result<T, OrchestrationError>;
pub type ModuleResult<T> = std::result::Result<T, ModuleError>;

/// Failures reported by a module implementation through the module contract.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ModuleError {
    #[error("Initialization failed: {0}")]
    Initialization(String),
    #[error("Execution failed: {0}")]
    Execution(String),
    #[error("Cleanup failed: {0}")]
    Cleanup(String),
    #[error("Rollback failed: {0}")]
    Rollback(String),
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl ModuleError {
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization(message.into())
    }
}

/// Registration and startup-ordering errors. Always surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Module '{name}' is already registered")]
    DuplicateModule { name: String },

    #[error("Module '{module}' requires dependency '{dependency}' which is not registered")]
    MissingDependency { module: String, dependency: String },

    #[error(
        "Module '{module}' requires '{dependency}' version {required}, but version {available} is registered"
    )]
    IncompatibleVersion {
        module: String,
        dependency: String,
        required: String,
        available: String,
    },

    #[error("Circular dependency detected involving module '{module}' (cycle: {})", .cycle.join(" -> "))]
    CircularDependency { module: String, cycle: Vec<String> },

    #[error("Module '{name}' is not registered")]
    ModuleNotFound { name: String },

    #[error("Module '{name}' cannot be removed while required by {dependents:?}")]
    HasDependents { name: String, dependents: Vec<String> },

    #[error("Failed to start module '{name}': {reason}")]
    StartFailed { name: String, reason: String },

    #[error("Invalid version '{value}': {reason}")]
    InvalidVersion { value: String, reason: String },
}

/// Errors thrown out of orchestrator entry points. Stage failures never land here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestrationError {
    #[error("Orchestrator has not been initialized")]
    NotInitialized,

    #[error("Orchestrator is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Module '{module}' failed to initialize: {reason}")]
    ModuleInitialization { module: String, reason: String },

    #[error("Invalid workflow configuration for field {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },
}

/// Why a single stage ended in `failed`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    #[error("Module not found for stage: {stage}")]
    ModuleNotFound { stage: String },

    #[error("Stage '{stage}' timed out after {timeout:?}")]
    Timeout { stage: String, timeout: Duration },

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("Stage '{stage}' was cancelled")]
    Cancelled { stage: String },
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::ModuleNotFound { .. } => ErrorKind::ModuleNotFound,
            StageError::Timeout { .. } => ErrorKind::Timeout,
            StageError::Module(_) => ErrorKind::Module,
            StageError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StageError::Timeout { .. })
    }
}

/// Errors raised by the event bus itself (not by listeners).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventBusError {
    #[error("Event persistence failed during {operation}: {reason}")]
    Persistence { operation: String, reason: String },

    #[error("Event bus has been shut down")]
    ShutDown,

    #[error("Subscription {subscription_id} not found")]
    SubscriptionNotFound { subscription_id: String },
}

/// Result of a listener invocation. `Transient` failures are eligible for the retry queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListenerError {
    #[error("Transient listener failure: {0}")]
    Transient(String),
    #[error("Listener failed: {0}")]
    Failed(String),
    #[error("Listener timed out after {0:?}")]
    Timeout(Duration),
}

impl ListenerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ListenerError::Transient(_) | ListenerError::Timeout(_))
    }
}

/// Classification carried by serialisable error snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ModuleNotFound,
    Timeout,
    Module,
    Cancelled,
    WorkflowTimeout,
    Internal,
}

/// Cloneable, serialisable error snapshot stored inside stage and workflow results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn workflow_timeout(timeout: Duration) -> Self {
        Self::new(
            ErrorKind::WorkflowTimeout,
            format!("Workflow timed out after {}ms", timeout.as_millis()),
        )
    }
}

impl From<&StageError> for ErrorInfo {
    fn from(error: &StageError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}
