//! # Orchestration Types
//!
//! Workflow configuration, per-execution state and the results handed back to callers.

use super::backoff::RetryPolicy;
use crate::constants::{defaults, modules};
use crate::error::{ErrorInfo, OrchestrationError, OrchestrationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorHandlingPolicy {
    /// Keep running later stages after a failed one (sequential mode)
    pub continue_on_error: bool,
    /// Invoke `rollback` on completed stages when the workflow fails
    pub rollback_on_failure: bool,
    pub notification_enabled: bool,
}

impl Default for ErrorHandlingPolicy {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            rollback_on_failure: false,
            notification_enabled: true,
        }
    }
}

/// Immutable description of how one workflow runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfiguration {
    /// Stage names; each must match a registered module name
    pub stages: Vec<String>,
    pub execution_mode: ExecutionMode,
    /// Bound on stage execution as a whole
    pub timeout_ms: u64,
    pub retry_policy: RetryPolicy,
    pub error_handling: ErrorHandlingPolicy,
}

impl Default for WorkflowConfiguration {
    fn default() -> Self {
        Self {
            stages: vec![
                modules::PLAN.to_string(),
                modules::CONFIRM.to_string(),
                modules::TRACE.to_string(),
            ],
            execution_mode: ExecutionMode::Sequential,
            timeout_ms: defaults::WORKFLOW_TIMEOUT_MS,
            retry_policy: RetryPolicy::default(),
            error_handling: ErrorHandlingPolicy::default(),
        }
    }
}

impl WorkflowConfiguration {
    pub fn with_stages<I, S>(stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stages: stages.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.execution_mode == ExecutionMode::Parallel
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> OrchestrationResult<()> {
        if self.stages.is_empty() {
            return Err(invalid("stages", "at least one stage is required"));
        }
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.trim().is_empty() {
                return Err(invalid("stages", "stage names must not be empty"));
            }
            if !seen.insert(stage.as_str()) {
                return Err(invalid("stages", format!("stage '{stage}' is listed twice")));
            }
        }
        if self.timeout_ms == 0 {
            return Err(invalid("timeout_ms", "must be greater than zero"));
        }
        if self.retry_policy.max_attempts == 0 {
            return Err(invalid("retry_policy.max_attempts", "must be at least 1"));
        }
        let multiplier = self.retry_policy.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(invalid(
                "retry_policy.backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        Ok(())
    }

    /// Stable hash of the fields that change what a successful run produces.
    ///
    /// Error-handling policy is excluded: it only matters for failed runs,
    /// which are never cached.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.stages.hash(&mut hasher);
        self.execution_mode.hash(&mut hasher);
        self.timeout_ms.hash(&mut hasher);
        self.retry_policy.max_attempts.hash(&mut hasher);
        self.retry_policy.delay_ms.hash(&mut hasher);
        self.retry_policy.backoff_multiplier.to_bits().hash(&mut hasher);
        self.retry_policy.max_delay_ms.hash(&mut hasher);
        hasher.finish()
    }

    /// Result cache key: `workflow:{context_id}:{fingerprint}`.
    pub fn cache_key(&self, context_id: &str) -> String {
        format!("workflow:{context_id}:{:016x}", self.fingerprint())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> OrchestrationError {
    OrchestrationError::InvalidConfiguration {
        field: field.to_string(),
        reason: reason.into(),
    }
}

/// Per-call override; every `Some` field replaces the default wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfigOverride {
    pub stages: Option<Vec<String>>,
    pub execution_mode: Option<ExecutionMode>,
    pub timeout_ms: Option<u64>,
    pub retry_policy: Option<RetryPolicy>,
    pub error_handling: Option<ErrorHandlingPolicy>,
}

impl WorkflowConfigOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stages<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stages = Some(stages.into_iter().map(Into::into).collect());
        self
    }

    pub fn parallel(mut self) -> Self {
        self.execution_mode = Some(ExecutionMode::Parallel);
        self
    }

    pub fn sequential(mut self) -> Self {
        self.execution_mode = Some(ExecutionMode::Sequential);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn error_handling(mut self, policy: ErrorHandlingPolicy) -> Self {
        self.error_handling = Some(policy);
        self
    }

    pub fn continue_on_error(mut self) -> Self {
        let mut policy = self.error_handling.take().unwrap_or_default();
        policy.continue_on_error = true;
        self.error_handling = Some(policy);
        self
    }

    pub fn rollback_on_failure(mut self) -> Self {
        let mut policy = self.error_handling.take().unwrap_or_default();
        policy.rollback_on_failure = true;
        self.error_handling = Some(policy);
        self
    }

    pub fn apply(&self, base: &WorkflowConfiguration) -> WorkflowConfiguration {
        WorkflowConfiguration {
            stages: self.stages.clone().unwrap_or_else(|| base.stages.clone()),
            execution_mode: self.execution_mode.unwrap_or(base.execution_mode),
            timeout_ms: self.timeout_ms.unwrap_or(base.timeout_ms),
            retry_policy: self
                .retry_policy
                .clone()
                .unwrap_or_else(|| base.retry_policy.clone()),
            error_handling: self
                .error_handling
                .clone()
                .unwrap_or_else(|| base.error_handling.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Created,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Completed => f.write_str("completed"),
            WorkflowStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Terminal outcome of one stage. Never mutated after it is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub status: StageStatus,
    pub output: Option<Value>,
    pub error: Option<ErrorInfo>,
    pub attempts: u32,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl StageResult {
    pub fn completed(
        stage: impl Into<String>,
        output: Value,
        attempts: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        let completed_at = Utc::now();
        Self {
            stage: stage.into(),
            status: StageStatus::Completed,
            output: Some(output),
            error: None,
            attempts,
            duration_ms: elapsed_ms(started_at, completed_at),
            started_at,
            completed_at,
        }
    }

    pub fn failed(
        stage: impl Into<String>,
        error: ErrorInfo,
        attempts: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        let completed_at = Utc::now();
        Self {
            stage: stage.into(),
            status: StageStatus::Failed,
            output: None,
            error: Some(error),
            attempts,
            duration_ms: elapsed_ms(started_at, completed_at),
            started_at,
            completed_at,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StageStatus::Completed
    }
}

fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    (end - start).num_milliseconds().max(0) as u64
}

/// A stage whose module call is still outstanding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningStage {
    pub stage: String,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
}

/// Mutable state of one in-flight workflow. Only the orchestrator writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: Uuid,
    pub context_id: String,
    pub config: WorkflowConfiguration,
    pub status: ExecutionStatus,
    /// Completion order, not configured order
    pub stage_results: Vec<StageResult>,
    /// Stages that have started but not yet recorded a result
    #[serde(default)]
    pub running_stages: Vec<RunningStage>,
    pub metadata: HashMap<String, Value>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(context_id: impl Into<String>, config: WorkflowConfiguration) -> Self {
        let now = Utc::now();
        Self {
            execution_id: Uuid::new_v4(),
            context_id: context_id.into(),
            config,
            status: ExecutionStatus::Created,
            stage_results: Vec::new(),
            running_stages: Vec::new(),
            metadata: HashMap::new(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn stage_result(&self, stage: &str) -> Option<&StageResult> {
        self.stage_results.iter().find(|r| r.stage == stage)
    }

    pub fn record_stage(&mut self, result: StageResult) {
        self.running_stages.retain(|r| r.stage != result.stage);
        self.stage_results.push(result);
        self.updated_at = Utc::now();
    }

    pub fn mark_running(&mut self, stage: impl Into<String>, started_at: DateTime<Utc>) {
        self.running_stages.push(RunningStage {
            stage: stage.into(),
            attempt: 1,
            started_at,
        });
        self.updated_at = Utc::now();
    }

    pub fn note_attempt(&mut self, stage: &str, attempt: u32) {
        if let Some(running) = self.running_stages.iter_mut().find(|r| r.stage == stage) {
            running.attempt = attempt;
        }
    }

    /// Remove and return every stage still marked running.
    pub fn take_running_stages(&mut self) -> Vec<RunningStage> {
        std::mem::take(&mut self.running_stages)
    }

    pub fn set_status(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn has_failures(&self) -> bool {
        self.stage_results.iter().any(|r| !r.is_completed())
    }

    /// Completed stages, most recently completed first.
    pub fn completed_stages_reversed(&self) -> Vec<&StageResult> {
        self.stage_results
            .iter()
            .rev()
            .filter(|r| r.is_completed())
            .collect()
    }
}

/// Externally visible, cacheable outcome of one workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub execution_id: Uuid,
    pub context_id: String,
    pub status: WorkflowStatus,
    pub stages: Vec<StageResult>,
    pub total_duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub error: Option<ErrorInfo>,
    /// True when served from the result cache
    #[serde(default)]
    pub from_cache: bool,
}

impl WorkflowResult {
    pub(crate) fn from_context(context: &ExecutionContext, error: Option<ErrorInfo>) -> Self {
        let completed_at = Utc::now();
        let status = if error.is_none() && !context.has_failures() {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Failed
        };
        Self {
            execution_id: context.execution_id,
            context_id: context.context_id.clone(),
            status,
            stages: context.stage_results.clone(),
            total_duration_ms: elapsed_ms(context.started_at, completed_at),
            started_at: context.started_at,
            completed_at,
            error,
            from_cache: false,
        }
    }

    /// Copy of a cached result with timestamps refreshed to now.
    pub(crate) fn refreshed_from_cache(&self) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            completed_at: now,
            total_duration_ms: 0,
            from_cache: true,
            ..self.clone()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }

    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == name)
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.stage.as_str()).collect()
    }

    pub fn failed_stages(&self) -> Vec<&StageResult> {
        self.stages.iter().filter(|s| !s.is_completed()).collect()
    }
}
