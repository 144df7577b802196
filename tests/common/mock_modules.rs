use async_trait::async_trait;
use mplp_core::error::{ModuleError, ModuleResult};
use mplp_core::events::{EventBus, EventBusConfig};
use mplp_core::module::{ModuleDescriptor, ModuleState, ModuleStatus, ProtocolModule, StageContext};
use mplp_core::orchestration::{CoreOrchestrator, OrchestratorConfig, WorkflowConfiguration};
use mplp_core::registry::ModuleRegistry;
use mplp_core::cache::ResultCache;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a [`MockModule`] does when executed.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Return `{"module": name, "attempt": n}`
    Succeed,
    /// Fail with an execution error on every call
    Fail,
    /// Fail with an execution error for the first `n` calls, then succeed
    FailTimes(u32),
    /// Sleep, then succeed. Returns early with `Cancelled` when the token fires.
    Sleep(Duration),
    /// Sleep ignoring the cancellation token, then succeed
    SleepIgnoringCancellation(Duration),
}

/// Configurable module that records every lifecycle call.
pub struct MockModule {
    name: String,
    behavior: Behavior,
    fail_cleanup: bool,
    fail_initialize: bool,
    pub executions: AtomicU32,
    pub initializations: AtomicU32,
    pub cleanups: AtomicU32,
    pub rollbacks: AtomicU32,
    pub completed_late: AtomicU32,
    journal: Option<Arc<Mutex<Vec<String>>>>,
}

impl MockModule {
    pub fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            fail_cleanup: false,
            fail_initialize: false,
            executions: AtomicU32::new(0),
            initializations: AtomicU32::new(0),
            cleanups: AtomicU32::new(0),
            rollbacks: AtomicU32::new(0),
            completed_late: AtomicU32::new(0),
            journal: None,
        }
    }

    pub fn ok(name: &str) -> Arc<Self> {
        Arc::new(Self::new(name, Behavior::Succeed))
    }

    pub fn failing_cleanup(mut self) -> Self {
        self.fail_cleanup = true;
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    /// Append `"<op>:<name>"` entries to a shared journal for ordering assertions.
    pub fn with_journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
        self.journal = Some(journal);
        self
    }

    fn record(&self, op: &str) {
        if let Some(journal) = &self.journal {
            journal.lock().push(format!("{op}:{}", self.name));
        }
    }

    pub fn execution_count(&self) -> u32 {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> u32 {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn cleanup_count(&self) -> u32 {
        self.cleanups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolModule for MockModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> ModuleResult<()> {
        self.initializations.fetch_add(1, Ordering::SeqCst);
        self.record("init");
        if self.fail_initialize {
            return Err(ModuleError::initialization("missing prerequisite"));
        }
        Ok(())
    }

    async fn execute(&self, context: &StageContext) -> ModuleResult<Value> {
        let call = self.executions.fetch_add(1, Ordering::SeqCst) + 1;
        self.record("execute");
        let output = json!({ "module": self.name, "attempt": context.attempt });

        match &self.behavior {
            Behavior::Succeed => Ok(output),
            Behavior::Fail => Err(ModuleError::execution(format!("{} failed", self.name))),
            Behavior::FailTimes(n) if call <= *n => Err(ModuleError::execution(format!(
                "{} failed on call {call}",
                self.name
            ))),
            Behavior::FailTimes(_) => Ok(output),
            Behavior::Sleep(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(*duration) => Ok(output),
                    _ = context.cancelled() => Err(ModuleError::Cancelled(self.name.clone())),
                }
            }
            Behavior::SleepIgnoringCancellation(duration) => {
                tokio::time::sleep(*duration).await;
                self.completed_late.fetch_add(1, Ordering::SeqCst);
                Ok(output)
            }
        }
    }

    async fn cleanup(&self) -> ModuleResult<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        self.record("cleanup");
        if self.fail_cleanup {
            return Err(ModuleError::Cleanup(format!("{} refused to stop", self.name)));
        }
        Ok(())
    }

    fn status(&self) -> ModuleStatus {
        ModuleStatus::new(&self.name, ModuleState::Idle)
    }

    async fn rollback(&self, _context: &StageContext) -> ModuleResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.record("rollback");
        Ok(())
    }
}

/// Orchestrator config for tests: short module timeout, given stages.
pub fn test_config(stages: &[&str]) -> OrchestratorConfig {
    OrchestratorConfig {
        module_timeout_ms: 1_000,
        enable_event_logging: false,
        default_workflow: WorkflowConfiguration::with_stages(stages.iter().copied()),
        ..OrchestratorConfig::default()
    }
}

/// Orchestrator with a 5-minute result cache.
pub fn orchestrator_with(config: OrchestratorConfig) -> CoreOrchestrator {
    let registry = Arc::new(ModuleRegistry::new());
    let bus = Arc::new(EventBus::new(EventBusConfig::default()));
    let cache = Arc::new(ResultCache::new(1_000, Duration::from_secs(300)));
    CoreOrchestrator::new(config, registry, bus).with_cache(cache)
}

/// Register the modules, then initialize.
pub async fn started_orchestrator(
    config: OrchestratorConfig,
    modules: Vec<Arc<MockModule>>,
) -> CoreOrchestrator {
    let orchestrator = orchestrator_with(config);
    for module in modules {
        orchestrator
            .register_module(ModuleDescriptor::new(module))
            .await
            .unwrap();
    }
    orchestrator.initialize().await.unwrap();
    orchestrator
}
