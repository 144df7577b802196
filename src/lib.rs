#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # MPLP Core
//!
//! Module orchestration engine for multi-agent project lifecycles.
//!
//! ## Overview
//!
//! Business capabilities (context, planning, confirmation, tracing, ...) are
//! packaged as independent protocol modules. This crate registers them with
//! their declared dependencies, starts them in a safe order, and runs workflows
//! over them: ordered or parallel stages with per-stage timeouts, retries,
//! rollback, lifecycle events and memoised results.
//!
//! ## Module Organization
//!
//! - [`module`] - Module contract, descriptors and version constraints
//! - [`registry`] - Dependency graph and module lifecycle ordering
//! - [`orchestration`] - Workflow configuration, execution and results
//! - [`events`] - Event bus, listeners, middleware and persistence
//! - [`cache`] - Workflow result cache
//! - [`coordinator`] - Service adapters and batch module installation
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging bootstrap
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mplp_core::config::ConfigManager;
//! use mplp_core::coordinator::{ModuleCoordinator, ServiceModule};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_defaults()?;
//! let orchestrator = manager.build_orchestrator();
//!
//! let mut coordinator = ModuleCoordinator::new();
//! for stage in ["plan", "confirm", "trace"] {
//!     coordinator.add(
//!         Arc::new(ServiceModule::from_fn(stage, |ctx| async move {
//!             Ok(serde_json::json!({ "stage": ctx.stage }))
//!         })),
//!         "1.0.0",
//!         &[],
//!     )?;
//! }
//! coordinator.install(&orchestrator).await?;
//! orchestrator.initialize().await?;
//!
//! let result = orchestrator.execute_workflow("project-42", None).await?;
//! assert!(result.is_success());
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod logging;
pub mod module;
pub mod orchestration;
pub mod registry;

pub use cache::{CacheConfig, CacheStats, ResultCache};
pub use config::{ConfigManager, ConfigurationError, LogFormat, LoggingConfig, MplpConfig};
pub use coordinator::{ModuleCoordinator, ServiceModule, StageHandler};
pub use error::{
    ErrorInfo, ErrorKind, EventBusError, ListenerError, ModuleError, MplpError, MplpResult,
    OrchestrationError, RegistryError, StageError,
};
pub use events::{Event, EventBus, EventBusConfig, EventQuery, SubscriptionOptions};
pub use module::{
    ModuleDependency, ModuleDescriptor, ModuleState, ModuleStatus, ProtocolModule, StageContext,
};
pub use orchestration::{
    CoreOrchestrator, ExecutionMode, OrchestratorConfig, RetryPolicy, WorkflowConfigOverride,
    WorkflowConfiguration, WorkflowHooks, WorkflowResult, WorkflowStatus,
};
pub use registry::{DependencyGraph, ModuleRegistry};
