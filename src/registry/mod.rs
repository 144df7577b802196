//! # Module Registry Infrastructure
//!
//! Registration, dependency validation and lifecycle ordering for protocol modules.
//!
//! ## Architecture
//!
//! ```text
//! Registry Infrastructure
//! ├── ModuleRegistry     (descriptors, validation, start/stop)
//! └── DependencyGraph    (adjacency, reverse edges, topological sort)
//! ```

pub mod dependency_graph;
pub mod module_registry;

pub use dependency_graph::DependencyGraph;
pub use module_registry::{ModuleRegistry, RegistryStats, ShutdownReport};
