//! Lifecycle hooks around workflow and stage execution.
//!
//! Hooks observe; they cannot alter control flow. Every method defaults to a no-op.

use super::types::{ExecutionContext, StageResult, WorkflowResult};
use crate::error::ErrorInfo;
use async_trait::async_trait;

#[async_trait]
pub trait WorkflowHooks: Send + Sync {
    async fn before_workflow(&self, _context: &ExecutionContext) {}

    async fn after_workflow(&self, _result: &WorkflowResult) {}

    async fn before_stage(&self, _stage: &str, _context: &ExecutionContext) {}

    async fn after_stage(&self, _result: &StageResult) {}

    /// Called for each stage failure and for workflow-level failures (`stage` is `None`).
    async fn on_error(&self, _stage: Option<&str>, _error: &ErrorInfo) {}
}

/// Hooks implementation that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

#[async_trait]
impl WorkflowHooks for NoopHooks {}
