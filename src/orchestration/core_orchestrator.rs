//! # Core Orchestrator
//!
//! Runs workflows: an ordered or parallel set of stages against one business
//! context, one module invocation per stage.
//!
//! ## Execution lifecycle
//!
//! ```text
//! execute_workflow(context_id, override)
//!   ├── merge override over the default workflow, validate
//!   ├── result cache lookup ─── hit ──→ copy with fresh timestamps (no module runs)
//!   ├── wait for a concurrency permit
//!   ├── created → running
//!   ├── stages (sequential or parallel), bounded by the workflow timeout
//!   │     └── per stage: attempts × (spawned module call bounded by module timeout)
//!   ├── rollback completed stages when failed and rollback_on_failure
//!   ├── running → completed | failed
//!   └── cache the result if completed
//! ```
//!
//! ## Timeouts are advisory
//!
//! Each module call runs in its own spawned task. When the module timeout or the
//! workflow timeout fires, the orchestrator cancels the stage's
//! [`CancellationToken`](tokio_util::sync::CancellationToken) and stops waiting,
//! but does not abort the task. A module that ignores its token may still finish
//! later and mutate shared state after its stage was recorded as failed.

use super::config::OrchestratorConfig;
use super::hooks::{NoopHooks, WorkflowHooks};
use super::types::{
    ExecutionContext, ExecutionStatus, StageResult, WorkflowConfigOverride,
    WorkflowConfiguration, WorkflowResult,
};
use crate::cache::{CacheStats, ResultCache};
use crate::constants::events;
use crate::error::{
    ErrorInfo, EventBusError, ModuleError, OrchestrationError, OrchestrationResult,
    RegistryError, StageError,
};
use crate::events::{
    Event, EventBus, EventBusStats, EventListener, EventLoggingMiddleware, PublishReport,
    SubscriptionId, SubscriptionOptions,
};
use crate::logging::{log_error, log_stage_operation, log_workflow_operation};
use crate::module::{ModuleDescriptor, ModuleStatus, ProtocolModule, StageContext};
use crate::registry::{ModuleRegistry, ShutdownReport};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type ExecutionHandle = Arc<RwLock<ExecutionContext>>;

pub struct CoreOrchestrator {
    config: OrchestratorConfig,
    registry: Arc<ModuleRegistry>,
    event_bus: Arc<EventBus>,
    cache: Option<Arc<ResultCache<WorkflowResult>>>,
    hooks: Arc<dyn WorkflowHooks>,
    active_executions: DashMap<Uuid, ExecutionHandle>,
    permits: Arc<Semaphore>,
    initialized: AtomicBool,
    shutting_down: AtomicBool,
    listener_ids: Mutex<Vec<SubscriptionId>>,
    retry_processor: Mutex<Option<JoinHandle<()>>>,
}

impl CoreOrchestrator {
    /// Build an orchestrator around explicitly owned collaborators. No cache is
    /// attached; see [`Self::with_cache`].
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<ModuleRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        if config.enable_event_logging {
            event_bus.add_middleware(Arc::new(EventLoggingMiddleware));
        }
        let permits = Arc::new(Semaphore::new(config.max_concurrent_executions.max(1)));

        Self {
            config,
            registry,
            event_bus,
            cache: None,
            hooks: Arc::new(NoopHooks),
            active_executions: DashMap::new(),
            permits,
            initialized: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            listener_ids: Mutex::new(Vec::new()),
            retry_processor: Mutex::new(None),
        }
    }

    /// Attach a result cache. Ignored when `cache_enabled` is false.
    pub fn with_cache(mut self, cache: Arc<ResultCache<WorkflowResult>>) -> Self {
        if self.config.cache_enabled {
            self.cache = Some(cache);
        }
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn WorkflowHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn ensure_accepting(&self) -> OrchestrationResult<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(OrchestrationError::ShuttingDown);
        }
        Ok(())
    }

    // ===== Module registration =====

    /// Register a module. Modules registered after [`Self::initialize`] are started immediately.
    pub async fn register_module(&self, descriptor: ModuleDescriptor) -> OrchestrationResult<()> {
        self.ensure_accepting()?;

        let name = descriptor.name.clone();
        let version = descriptor.version.to_string();
        self.registry.register(descriptor)?;

        self.emit(
            Event::new(events::MODULE_REGISTERED)
                .with_data(json!({ "module": name, "version": version })),
        )
        .await;

        if self.is_initialized() {
            let started = self.registry.start_module(&name).await.map_err(|e| {
                OrchestrationError::ModuleInitialization {
                    module: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            self.emit_started(&started).await;
        }
        Ok(())
    }

    /// Register modules in order, stopping at the first rejection.
    pub async fn register_modules(
        &self,
        descriptors: impl IntoIterator<Item = ModuleDescriptor>,
    ) -> OrchestrationResult<()> {
        for descriptor in descriptors {
            self.register_module(descriptor).await?;
        }
        Ok(())
    }

    /// Required modules that are not registered.
    pub fn validate_module_registration(&self) -> Vec<String> {
        self.config
            .required_modules
            .iter()
            .filter(|name| !self.registry.contains(name))
            .cloned()
            .collect()
    }

    /// Check required modules, start every module in dependency order and
    /// start the event bus retry processor.
    pub async fn initialize(&self) -> OrchestrationResult<()> {
        self.ensure_accepting()?;
        if self.is_initialized() {
            debug!("Orchestrator already initialized");
            return Ok(());
        }

        self.config.validate()?;

        if let Some(missing) = self.validate_module_registration().into_iter().next() {
            error!(module = %missing, "Required module is not registered");
            return Err(RegistryError::ModuleNotFound { name: missing }.into());
        }

        let started = self.registry.start_all().await.map_err(|e| match e {
            RegistryError::StartFailed { name, reason } => {
                OrchestrationError::ModuleInitialization {
                    module: name,
                    reason,
                }
            }
            other => OrchestrationError::Registry(other),
        })?;
        self.emit_started(&started).await;

        {
            let mut processor = self.retry_processor.lock();
            if processor.is_none() {
                *processor = Some(self.event_bus.spawn_retry_processor());
            }
        }

        self.initialized.store(true, Ordering::Release);
        info!(
            modules = self.registry.len(),
            startup_order = ?self.registry.last_startup_order(),
            "🚀 ORCHESTRATOR: Initialized"
        );
        Ok(())
    }

    async fn emit_started(&self, started: &[String]) {
        for name in started {
            self.emit(Event::new(events::MODULE_STARTED).with_data(json!({ "module": name })))
                .await;
        }
    }

    // ===== Workflow execution =====

    /// Run a workflow for `context_id`.
    ///
    /// Stage failures are captured in the returned [`WorkflowResult`]; this only
    /// errors when the orchestrator cannot run workflows at all or the merged
    /// configuration is invalid.
    pub async fn execute_workflow(
        &self,
        context_id: &str,
        config_override: Option<WorkflowConfigOverride>,
    ) -> OrchestrationResult<WorkflowResult> {
        self.ensure_accepting()?;
        if !self.is_initialized() {
            return Err(OrchestrationError::NotInitialized);
        }

        let config = match &config_override {
            Some(overrides) => overrides.apply(&self.config.default_workflow),
            None => self.config.default_workflow.clone(),
        };
        config.validate()?;

        let cache_key = config.cache_key(context_id);
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(&cache_key)) {
            let result = cached.refreshed_from_cache();
            info!(
                context_id = %context_id,
                execution_id = %result.execution_id,
                cache_key = %cache_key,
                "Serving workflow from cache"
            );
            self.emit(
                Event::new(events::WORKFLOW_CACHE_HIT)
                    .with_execution(result.execution_id)
                    .with_data(json!({ "context_id": context_id, "cache_key": cache_key })),
            )
            .await;
            return Ok(result);
        }

        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| OrchestrationError::ShuttingDown)?;

        let mut context = ExecutionContext::new(context_id, config.clone());
        context.insert_metadata("cache_key", Value::String(cache_key.clone()));
        context.set_status(ExecutionStatus::Running);
        let execution_id = context.execution_id;
        let handle: ExecutionHandle = Arc::new(RwLock::new(context));
        self.active_executions.insert(execution_id, Arc::clone(&handle));

        let result = self.run_execution(&handle, &config).await;

        self.active_executions.remove(&execution_id);

        if result.is_success() {
            if let Some(cache) = &self.cache {
                cache.set(cache_key, result.clone());
            }
        }
        Ok(result)
    }

    async fn run_execution(
        &self,
        handle: &ExecutionHandle,
        config: &WorkflowConfiguration,
    ) -> WorkflowResult {
        let snapshot = handle.read().clone();
        let execution_id = snapshot.execution_id;

        log_workflow_operation(
            "execute_workflow",
            Some(execution_id),
            Some(snapshot.context_id.as_str()),
            "started",
            None,
            Some(format!("stages={:?} mode={:?}", config.stages, config.execution_mode).as_str()),
        );
        self.emit(
            Event::new(events::WORKFLOW_STARTED)
                .with_execution(execution_id)
                .with_data(json!({
                    "context_id": snapshot.context_id,
                    "stages": config.stages,
                    "execution_mode": config.execution_mode,
                })),
        )
        .await;
        self.hooks.before_workflow(&snapshot).await;

        let workflow_token = CancellationToken::new();
        let workflow_error = match tokio::time::timeout(
            config.timeout(),
            self.run_stages(handle, config, &workflow_token),
        )
        .await
        {
            Ok(()) => None,
            Err(_) => {
                workflow_token.cancel();
                warn!(
                    execution_id = %execution_id,
                    timeout_ms = config.timeout_ms,
                    "Workflow timed out"
                );
                let error = ErrorInfo::workflow_timeout(config.timeout());
                self.abandon_running_stages(handle, &error).await;
                Some(error)
            }
        };

        let failed = workflow_error.is_some() || handle.read().has_failures();
        if failed && config.error_handling.rollback_on_failure {
            self.rollback(handle).await;
        }

        let final_status = if failed {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };
        handle.write().set_status(final_status);

        let result = WorkflowResult::from_context(&handle.read(), workflow_error.clone());
        self.finish(&result, workflow_error.as_ref()).await;
        result
    }

    /// Record stages cut off by the workflow timeout as failed.
    async fn abandon_running_stages(&self, handle: &ExecutionHandle, error: &ErrorInfo) {
        let (execution_id, abandoned) = {
            let mut context = handle.write();
            (context.execution_id, context.take_running_stages())
        };

        for running in abandoned {
            let result = StageResult::failed(
                &running.stage,
                error.clone(),
                running.attempt,
                running.started_at,
            );
            handle.write().record_stage(result.clone());
            self.report_stage(execution_id, &result).await;
        }
    }

    async fn finish(&self, result: &WorkflowResult, workflow_error: Option<&ErrorInfo>) {
        if let Some(error) = workflow_error {
            self.hooks.on_error(None, error).await;
        }

        let event_type = if result.is_success() {
            events::WORKFLOW_COMPLETED
        } else {
            events::WORKFLOW_FAILED
        };
        let failed_stages: Vec<&str> = result
            .failed_stages()
            .iter()
            .map(|s| s.stage.as_str())
            .collect();
        self.emit(
            Event::new(event_type)
                .with_execution(result.execution_id)
                .with_data(json!({
                    "context_id": result.context_id,
                    "status": result.status,
                    "stages": result.stage_names(),
                    "failed_stages": failed_stages,
                    "duration_ms": result.total_duration_ms,
                    "error": result.error,
                })),
        )
        .await;
        self.hooks.after_workflow(result).await;

        log_workflow_operation(
            "execute_workflow",
            Some(result.execution_id),
            Some(result.context_id.as_str()),
            &result.status.to_string(),
            Some(result.total_duration_ms),
            result.error.as_ref().map(|e| e.message.as_str()),
        );
    }

    async fn run_stages(
        &self,
        handle: &ExecutionHandle,
        config: &WorkflowConfiguration,
        workflow_token: &CancellationToken,
    ) {
        if config.is_parallel() {
            let stages = config
                .stages
                .iter()
                .map(|stage| self.execute_stage(handle, stage, config, workflow_token));
            join_all(stages).await;
            return;
        }

        for stage in &config.stages {
            let result = self.execute_stage(handle, stage, config, workflow_token).await;
            let failed = !result.is_completed();

            if failed && !config.error_handling.continue_on_error {
                debug!(stage = %stage, "Stopping after failed stage");
                break;
            }
        }
    }

    async fn execute_stage(
        &self,
        handle: &ExecutionHandle,
        stage: &str,
        config: &WorkflowConfiguration,
        workflow_token: &CancellationToken,
    ) -> StageResult {
        let started_at = Utc::now();
        let snapshot = handle.read().clone();
        let execution_id = snapshot.execution_id;

        self.hooks.before_stage(stage, &snapshot).await;
        handle.write().mark_running(stage, started_at);
        self.emit(
            Event::new(events::STAGE_STARTED)
                .with_execution(execution_id)
                .with_stage(stage),
        )
        .await;
        log_stage_operation("execute_stage", execution_id, stage, "started", None, None);

        let outcome = match self.registry.get(stage) {
            Some(module) => {
                self.attempt_stage(handle, module, stage, &snapshot, config, workflow_token)
                    .await
            }
            None => (
                Err(StageError::ModuleNotFound {
                    stage: stage.to_string(),
                }),
                0,
            ),
        };

        let result = match outcome {
            (Ok(output), attempts) => StageResult::completed(stage, output, attempts, started_at),
            (Err(error), attempts) => {
                StageResult::failed(stage, ErrorInfo::from(&error), attempts, started_at)
            }
        };
        handle.write().record_stage(result.clone());

        self.report_stage(execution_id, &result).await;
        result
    }

    /// Terminal stage event, hooks and log line.
    async fn report_stage(&self, execution_id: Uuid, result: &StageResult) {
        let stage = result.stage.as_str();
        match &result.error {
            None => {
                self.emit(
                    Event::new(events::STAGE_COMPLETED)
                        .with_execution(execution_id)
                        .with_stage(stage)
                        .with_data(json!({
                            "output": result.output,
                            "attempts": result.attempts,
                            "duration_ms": result.duration_ms,
                        })),
                )
                .await;
            }
            Some(error) => {
                self.emit(
                    Event::new(events::STAGE_FAILED)
                        .with_execution(execution_id)
                        .with_stage(stage)
                        .with_data(json!({
                            "error": error,
                            "attempts": result.attempts,
                            "duration_ms": result.duration_ms,
                        })),
                )
                .await;
                self.hooks.on_error(Some(stage), error).await;
            }
        }
        self.hooks.after_stage(result).await;

        log_stage_operation(
            "execute_stage",
            execution_id,
            stage,
            if result.is_completed() { "completed" } else { "failed" },
            Some(result.duration_ms),
            result.error.as_ref().map(|e| e.message.as_str()),
        );
    }

    /// Run a stage under the retry policy. Returns the outcome and the number of attempts made.
    async fn attempt_stage(
        &self,
        handle: &ExecutionHandle,
        module: Arc<dyn ProtocolModule>,
        stage: &str,
        snapshot: &ExecutionContext,
        config: &WorkflowConfiguration,
        workflow_token: &CancellationToken,
    ) -> (Result<Value, StageError>, u32) {
        let policy = &config.retry_policy;
        let mut attempt = 1;

        loop {
            handle.write().note_attempt(stage, attempt);
            let context = StageContext::new(
                stage,
                attempt,
                snapshot.clone(),
                workflow_token.child_token(),
            );
            let outcome =
                Self::invoke_module(Arc::clone(&module), context, self.config.module_timeout())
                    .await;

            let error = match outcome {
                Ok(output) => return (Ok(output), attempt),
                Err(error) => error,
            };

            let retryable = matches!(
                error,
                StageError::Timeout { .. } | StageError::Module(ModuleError::Execution(_))
            );
            if !retryable || !policy.should_retry(attempt) || workflow_token.is_cancelled() {
                return (Err(error), attempt);
            }

            let delay = policy.delay_for_attempt(attempt);
            warn!(
                execution_id = %snapshot.execution_id,
                stage = %stage,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying stage"
            );
            self.emit(
                Event::new(events::STAGE_RETRYING)
                    .with_execution(snapshot.execution_id)
                    .with_stage(stage)
                    .with_data(json!({
                        "attempt": attempt,
                        "next_attempt": attempt + 1,
                        "delay_ms": delay.as_millis() as u64,
                        "error": error.to_string(),
                    })),
            )
            .await;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = workflow_token.cancelled() => {
                    return (Err(StageError::Cancelled { stage: stage.to_string() }), attempt);
                }
            }
            attempt += 1;
        }
    }

    /// One module call in its own task, bounded by `timeout`.
    async fn invoke_module(
        module: Arc<dyn ProtocolModule>,
        context: StageContext,
        timeout: Duration,
    ) -> Result<Value, StageError> {
        let token = context.cancellation_token.clone();
        let stage = context.stage.clone();
        let mut task = tokio::spawn(async move { module.execute(&context).await });

        tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result.map_err(StageError::from),
                Err(join_error) => Err(StageError::Module(ModuleError::Execution(format!(
                    "module task aborted: {join_error}"
                )))),
            },
            _ = tokio::time::sleep(timeout) => {
                token.cancel();
                Err(StageError::Timeout { stage, timeout })
            }
            _ = token.cancelled() => Err(StageError::Cancelled { stage }),
        }
    }

    /// Roll back completed stages, most recently completed first. Best effort.
    async fn rollback(&self, handle: &ExecutionHandle) {
        let snapshot = handle.read().clone();
        let completed: Vec<String> = snapshot
            .completed_stages_reversed()
            .into_iter()
            .map(|r| r.stage.clone())
            .collect();

        for stage in completed {
            let Some(module) = self.registry.get(&stage) else {
                continue;
            };
            let context = StageContext::new(&stage, 1, snapshot.clone(), CancellationToken::new());
            let rollback_error = module.rollback(&context).await.err().map(|e| e.to_string());
            if let Some(e) = &rollback_error {
                log_error(
                    "orchestrator",
                    "rollback",
                    e,
                    Some(&format!("execution_id={} stage={}", snapshot.execution_id, stage)),
                );
            }
            self.emit(
                Event::new(events::STAGE_ROLLED_BACK)
                    .with_execution(snapshot.execution_id)
                    .with_stage(&stage)
                    .with_data(json!({
                        "success": rollback_error.is_none(),
                        "error": rollback_error,
                    })),
            )
            .await;
        }
    }

    // ===== Observability =====

    /// Snapshot of in-flight executions.
    pub fn get_active_executions(&self) -> Vec<ExecutionContext> {
        self.active_executions
            .iter()
            .map(|entry| entry.value().read().clone())
            .collect()
    }

    pub fn active_execution_count(&self) -> usize {
        self.active_executions.len()
    }

    pub fn get_module_statuses(&self) -> HashMap<String, ModuleStatus> {
        self.registry
            .modules()
            .into_iter()
            .map(|(name, module)| (name, module.status()))
            .collect()
    }

    pub fn event_statistics(&self) -> EventBusStats {
        self.event_bus.stats()
    }

    pub fn event_history(&self, limit: Option<usize>) -> Vec<Event> {
        self.event_bus.history(limit)
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    // ===== Events =====

    /// Listen to every event the orchestrator sees.
    pub fn add_event_listener(&self, listener: Arc<dyn EventListener>) -> SubscriptionId {
        self.track(
            self.event_bus
                .subscribe("*", listener, SubscriptionOptions::default()),
        )
    }

    pub fn remove_event_listener(&self, id: SubscriptionId) -> Result<(), EventBusError> {
        self.listener_ids.lock().retain(|tracked| *tracked != id);
        self.event_bus.unsubscribe(id)
    }

    pub fn add_event_type_listener(
        &self,
        event_type: &str,
        listener: Arc<dyn EventListener>,
    ) -> SubscriptionId {
        self.track(
            self.event_bus
                .subscribe(event_type, listener, SubscriptionOptions::default()),
        )
    }

    /// Listen to `stage_*` events for one stage only.
    pub fn add_stage_event_listener(
        &self,
        stage: &str,
        listener: Arc<dyn EventListener>,
    ) -> SubscriptionId {
        let stage = stage.to_string();
        let options = SubscriptionOptions::default()
            .filter(move |event| event.stage.as_deref() == Some(stage.as_str()));
        self.track(self.event_bus.subscribe("stage_*", listener, options))
    }

    fn track(&self, id: SubscriptionId) -> SubscriptionId {
        self.listener_ids.lock().push(id);
        id
    }

    /// Publish a business event on behalf of a module.
    pub async fn emit_module_event(
        &self,
        event_type: &str,
        stage: Option<&str>,
        data: Value,
    ) -> Result<PublishReport, EventBusError> {
        let mut event = Event::new(event_type).with_data(data);
        if let Some(stage) = stage {
            event = event.with_stage(stage);
        }
        self.event_bus.publish(event).await
    }

    async fn emit(&self, event: Event) {
        if let Err(e) = self.event_bus.publish(event).await {
            debug!(error = %e, "Dropped orchestrator event");
        }
    }

    // ===== Shutdown =====

    /// Clean up every registered module (best effort), then drop listeners and active executions.
    pub async fn shutdown(&self) -> ShutdownReport {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            debug!("Orchestrator shutdown already in progress");
            return ShutdownReport::default();
        }
        info!(
            active_executions = self.active_executions.len(),
            "🛑 ORCHESTRATOR: Shutting down"
        );
        self.permits.close();

        let report = self.registry.stop_all().await;
        for name in &report.stopped {
            self.emit(Event::new(events::MODULE_STOPPED).with_data(json!({ "module": name })))
                .await;
        }

        let listener_ids: Vec<SubscriptionId> = self.listener_ids.lock().drain(..).collect();
        for id in listener_ids {
            if let Err(e) = self.event_bus.unsubscribe(id) {
                debug!(error = %e, "Listener already removed");
            }
        }
        self.event_bus.shutdown();
        let processor = self.retry_processor.lock().take();
        if let Some(processor) = processor {
            if let Err(e) = processor.await {
                warn!(error = %e, "Event retry processor ended abnormally");
            }
        }
        self.active_executions.clear();
        self.initialized.store(false, Ordering::Release);

        info!(
            stopped = report.stopped.len(),
            failures = report.failures.len(),
            "🛑 ORCHESTRATOR: Shutdown complete"
        );
        report
    }
}
