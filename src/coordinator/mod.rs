//! # Module Coordination
//!
//! Adapters that turn business services into protocol modules, and a
//! coordinator that installs a batch of them into an orchestrator.

pub mod module_coordinator;
pub mod service_module;

pub use module_coordinator::ModuleCoordinator;
pub use service_module::{FnStageHandler, ServiceModule, StageHandler};
