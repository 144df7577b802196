//! # Service Module Adapter
//!
//! Wraps a business service ([`StageHandler`]) in the module contract so the
//! registry and orchestrator never see concrete module types. The adapter
//! owns the bookkeeping the contract asks for: self-reported state, error
//! count, last execution time and initialise-once semantics.

use crate::error::{ModuleError, ModuleResult};
use crate::module::{ModuleState, ModuleStatus, ProtocolModule, StageContext};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Business logic behind one stage.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(&self, context: &StageContext) -> ModuleResult<Value>;

    /// Acquire prerequisites. Called once by the first `initialize`.
    async fn prepare(&self) -> ModuleResult<()> {
        Ok(())
    }

    async fn release(&self) -> ModuleResult<()> {
        Ok(())
    }

    async fn undo(&self, _context: &StageContext) -> ModuleResult<()> {
        Ok(())
    }
}

/// Handler backed by an async closure taking an owned [`StageContext`].
pub struct FnStageHandler<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> StageHandler for FnStageHandler<F>
where
    F: Fn(StageContext) -> Fut + Send + Sync,
    Fut: Future<Output = ModuleResult<Value>> + Send + 'static,
{
    async fn handle(&self, context: &StageContext) -> ModuleResult<Value> {
        (self.func)(context.clone()).await
    }
}

#[derive(Debug)]
struct ServiceState {
    initialized: bool,
    status: ModuleState,
    last_execution_time: Option<chrono::DateTime<Utc>>,
    error_count: u64,
}

pub struct ServiceModule {
    name: String,
    handler: Arc<dyn StageHandler>,
    state: Mutex<ServiceState>,
}

impl ServiceModule {
    pub fn new(name: impl Into<String>, handler: Arc<dyn StageHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
            state: Mutex::new(ServiceState {
                initialized: false,
                status: ModuleState::Idle,
                last_execution_time: None,
                error_count: 0,
            }),
        }
    }

    pub fn from_fn<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ModuleResult<Value>> + Send + 'static,
    {
        Self::new(name, Arc::new(FnStageHandler { func }))
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }
}

#[async_trait]
impl ProtocolModule for ServiceModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> ModuleResult<()> {
        if self.is_initialized() {
            debug!(module = %self.name, "Module already initialized");
            return Ok(());
        }

        if let Err(e) = self.handler.prepare().await {
            let mut state = self.state.lock();
            state.status = ModuleState::Error;
            state.error_count += 1;
            return Err(ModuleError::Initialization(e.to_string()));
        }

        let mut state = self.state.lock();
        state.initialized = true;
        state.status = ModuleState::Initialized;
        Ok(())
    }

    async fn execute(&self, context: &StageContext) -> ModuleResult<Value> {
        {
            let mut state = self.state.lock();
            if !state.initialized {
                return Err(ModuleError::Execution(format!(
                    "module '{}' is not initialized",
                    self.name
                )));
            }
            state.status = ModuleState::Running;
        }

        let outcome = self.handler.handle(context).await;

        let mut state = self.state.lock();
        state.last_execution_time = Some(Utc::now());
        match &outcome {
            Ok(_) => state.status = ModuleState::Idle,
            Err(e) => {
                state.status = ModuleState::Error;
                state.error_count += 1;
                warn!(module = %self.name, stage = %context.stage, error = %e, "Module execution failed");
            }
        }
        outcome
    }

    async fn cleanup(&self) -> ModuleResult<()> {
        let released = self.handler.release().await;
        let mut state = self.state.lock();
        state.initialized = false;
        match released {
            Ok(()) => {
                state.status = ModuleState::Idle;
                Ok(())
            }
            Err(e) => {
                state.status = ModuleState::Error;
                state.error_count += 1;
                Err(ModuleError::Cleanup(e.to_string()))
            }
        }
    }

    fn status(&self) -> ModuleStatus {
        let state = self.state.lock();
        ModuleStatus {
            name: self.name.clone(),
            status: state.status,
            last_execution_time: state.last_execution_time,
            error_count: state.error_count,
        }
    }

    async fn rollback(&self, context: &StageContext) -> ModuleResult<()> {
        self.handler
            .undo(context)
            .await
            .map_err(|e| ModuleError::Rollback(e.to_string()))
    }
}
