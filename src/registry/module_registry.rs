//! # Module Registry
//!
//! Holds registered modules and their declared dependencies, computes startup
//! and shutdown order, and drives module start/stop.
//!
//! ## Concurrency
//!
//! All registry state (descriptors, dependency graph, started flags, last
//! startup order) sits behind a single `parking_lot::RwLock`, so an ordering
//! computation always sees a consistent graph snapshot. The lock is never held
//! across an `.await`; lifecycle calls into modules are serialised by a
//! separate async mutex so no module is ever started twice concurrently.
//!
//! ## Usage
//!
//! ```rust
//! use mplp_core::registry::ModuleRegistry;
//! use mplp_core::coordinator::ServiceModule;
//! use mplp_core::module::ModuleDescriptor;
//! use std::sync::Arc;
//!
//! let registry = ModuleRegistry::new();
//! let plan = Arc::new(ServiceModule::from_fn("plan", |_ctx| async { Ok(serde_json::json!({})) }));
//! let confirm = Arc::new(ServiceModule::from_fn("confirm", |_ctx| async { Ok(serde_json::json!({})) }));
//!
//! registry.register(ModuleDescriptor::new(plan)).unwrap();
//! registry.register(ModuleDescriptor::new(confirm).depends_on("plan")).unwrap();
//!
//! assert_eq!(registry.compute_startup_order().unwrap(), vec!["plan", "confirm"]);
//! assert_eq!(registry.compute_shutdown_order().unwrap(), vec!["confirm", "plan"]);
//! ```

use super::dependency_graph::DependencyGraph;
use crate::error::{RegistryError, RegistryResult};
use crate::module::{is_version_compatible, DescriptorInfo, ModuleDescriptor, ProtocolModule};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

struct RegisteredModule {
    descriptor: ModuleDescriptor,
    started: bool,
    registered_at: DateTime<Utc>,
}

#[derive(Default)]
struct RegistryState {
    modules: HashMap<String, RegisteredModule>,
    graph: DependencyGraph,
    last_startup_order: Vec<String>,
}

/// Outcome of stopping every module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub stopped: Vec<String>,
    pub failures: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_modules: usize,
    pub started_modules: usize,
    pub dependency_edges: usize,
    pub oldest_registration: Option<DateTime<Utc>>,
}

pub struct ModuleRegistry {
    state: RwLock<RegistryState>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Register a module. Does not start it.
    ///
    /// Rejects duplicate names, missing non-optional dependencies, version floors
    /// that are not met (in either direction), and registrations that would
    /// close a dependency cycle.
    pub fn register(&self, descriptor: ModuleDescriptor) -> RegistryResult<()> {
        let mut state = self.state.write();
        let name = descriptor.name.clone();

        if state.modules.contains_key(&name) {
            warn!(module = %name, "Rejected duplicate module registration");
            return Err(RegistryError::DuplicateModule { name });
        }

        Self::validate_dependencies(&state, &descriptor)?;
        Self::validate_existing_dependents(&state, &descriptor)?;

        let dependency_names = descriptor.dependency_names();
        if let Some(cycle) = state.graph.would_create_cycle(&name, &dependency_names) {
            warn!(module = %name, error = %cycle, "Rejected registration that would create a cycle");
            return Err(cycle);
        }

        state.graph.add_node(&name, dependency_names);
        info!(
            module = %name,
            version = %descriptor.version,
            dependencies = ?descriptor.dependency_names(),
            "Module registered"
        );
        state.modules.insert(
            name,
            RegisteredModule {
                descriptor,
                started: false,
                registered_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn validate_dependencies(
        state: &RegistryState,
        descriptor: &ModuleDescriptor,
    ) -> RegistryResult<()> {
        for dependency in &descriptor.dependencies {
            match state.modules.get(&dependency.name) {
                None if dependency.optional => {
                    debug!(
                        module = %descriptor.name,
                        dependency = %dependency.name,
                        "Optional dependency not registered"
                    );
                }
                None => {
                    return Err(RegistryError::MissingDependency {
                        module: descriptor.name.clone(),
                        dependency: dependency.name.clone(),
                    });
                }
                Some(registered) => {
                    if let Some(required) = &dependency.min_version {
                        let available = &registered.descriptor.version;
                        if !is_version_compatible(available, required) {
                            return Err(RegistryError::IncompatibleVersion {
                                module: descriptor.name.clone(),
                                dependency: dependency.name.clone(),
                                required: required.to_string(),
                                available: available.to_string(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Modules that optionally depend on the newcomer with a version floor must be satisfied too.
    fn validate_existing_dependents(
        state: &RegistryState,
        descriptor: &ModuleDescriptor,
    ) -> RegistryResult<()> {
        for dependent in state.graph.dependents_of(&descriptor.name) {
            let Some(registered) = state.modules.get(&dependent) else {
                continue;
            };
            let floor = registered
                .descriptor
                .dependencies
                .iter()
                .find(|d| d.name == descriptor.name)
                .and_then(|d| d.min_version.as_ref());
            if let Some(required) = floor {
                if !is_version_compatible(&descriptor.version, required) {
                    return Err(RegistryError::IncompatibleVersion {
                        module: dependent,
                        dependency: descriptor.name.clone(),
                        required: required.to_string(),
                        available: descriptor.version.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Remove a module. Rejected while registered modules still require it.
    pub fn unregister(&self, name: &str) -> RegistryResult<ModuleDescriptor> {
        let mut state = self.state.write();

        if !state.modules.contains_key(name) {
            return Err(RegistryError::ModuleNotFound {
                name: name.to_string(),
            });
        }

        let blocking: Vec<String> = state
            .graph
            .dependents_of(name)
            .into_iter()
            .filter(|dependent| {
                state.modules.get(dependent).is_some_and(|m| {
                    m.descriptor
                        .dependencies
                        .iter()
                        .any(|d| d.name == name && !d.optional)
                })
            })
            .collect();
        if !blocking.is_empty() {
            return Err(RegistryError::HasDependents {
                name: name.to_string(),
                dependents: blocking,
            });
        }

        state.graph.remove_node(name);
        state.last_startup_order.retain(|n| n != name);
        let removed = state
            .modules
            .remove(name)
            .map(|m| m.descriptor)
            .ok_or_else(|| RegistryError::ModuleNotFound {
                name: name.to_string(),
            })?;

        info!(module = %name, "Module unregistered");
        Ok(removed)
    }

    /// Topologically sorted module names; remembered for [`Self::compute_shutdown_order`].
    pub fn compute_startup_order(&self) -> RegistryResult<Vec<String>> {
        let mut state = self.state.write();
        let order = state.graph.topological_order().inspect_err(|e| {
            error!(error = %e, "Failed to compute module startup order");
        })?;
        state.last_startup_order = order.clone();
        debug!(order = ?order, "Computed module startup order");
        Ok(order)
    }

    /// Reverse of the most recently computed startup order (computed now if none exists yet).
    pub fn compute_shutdown_order(&self) -> RegistryResult<Vec<String>> {
        let needs_compute = {
            let state = self.state.read();
            state.last_startup_order.is_empty() && !state.modules.is_empty()
        };
        if needs_compute {
            self.compute_startup_order()?;
        }

        let state = self.state.read();
        Ok(state.last_startup_order.iter().rev().cloned().collect())
    }

    pub fn last_startup_order(&self) -> Vec<String> {
        self.state.read().last_startup_order.clone()
    }

    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.state.read().graph.dependencies_of(name)
    }

    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.state.read().graph.dependents_of(name)
    }

    pub fn dependency_graph(&self) -> HashMap<String, Vec<String>> {
        self.state.read().graph.adjacency()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProtocolModule>> {
        self.state
            .read()
            .modules
            .get(name)
            .map(|m| m.descriptor.module.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.read().modules.contains_key(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<DescriptorInfo> {
        self.state
            .read()
            .modules
            .get(name)
            .map(|m| DescriptorInfo::from(&m.descriptor))
    }

    /// Registered descriptors in registration order.
    pub fn descriptors(&self) -> Vec<DescriptorInfo> {
        let state = self.state.read();
        state
            .graph
            .nodes()
            .iter()
            .filter_map(|name| state.modules.get(name))
            .map(|m| DescriptorInfo::from(&m.descriptor))
            .collect()
    }

    /// `(name, module)` pairs in registration order.
    pub fn modules(&self) -> Vec<(String, Arc<dyn ProtocolModule>)> {
        let state = self.state.read();
        state
            .graph
            .nodes()
            .iter()
            .filter_map(|name| {
                state
                    .modules
                    .get(name)
                    .map(|m| (name.clone(), m.descriptor.module.clone()))
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.state.read().graph.nodes().to_vec()
    }

    pub fn len(&self) -> usize {
        self.state.read().modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().modules.is_empty()
    }

    pub fn is_started(&self, name: &str) -> bool {
        self.state
            .read()
            .modules
            .get(name)
            .is_some_and(|m| m.started)
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            total_modules: state.modules.len(),
            started_modules: state.modules.values().filter(|m| m.started).count(),
            dependency_edges: state
                .graph
                .nodes()
                .iter()
                .map(|n| state.graph.dependencies_of(n).len())
                .sum(),
            oldest_registration: state.modules.values().map(|m| m.registered_at).min(),
        }
    }

    /// Start one module, starting its registered dependencies first.
    /// Returns the names that were actually started by this call.
    pub async fn start_module(&self, name: &str) -> RegistryResult<Vec<String>> {
        let _guard = self.lifecycle.lock().await;

        let plan = {
            let state = self.state.read();
            if !state.modules.contains_key(name) {
                return Err(RegistryError::ModuleNotFound {
                    name: name.to_string(),
                });
            }
            let mut wanted = state.graph.transitive_dependencies(name);
            wanted.push(name.to_string());
            state
                .graph
                .topological_order()?
                .into_iter()
                .filter(|n| wanted.contains(n))
                .collect::<Vec<_>>()
        };

        self.start_in_order(&plan).await
    }

    /// Start every registered module in dependency order.
    pub async fn start_all(&self) -> RegistryResult<Vec<String>> {
        let _guard = self.lifecycle.lock().await;
        let order = self.compute_startup_order()?;
        info!(modules = order.len(), "Starting all modules");
        self.start_in_order(&order).await
    }

    async fn start_in_order(&self, order: &[String]) -> RegistryResult<Vec<String>> {
        let mut started = Vec::new();

        for name in order {
            let module = {
                let state = self.state.read();
                match state.modules.get(name) {
                    Some(m) if !m.started => m.descriptor.module.clone(),
                    Some(_) => {
                        debug!(module = %name, "Module already started");
                        continue;
                    }
                    None => continue,
                }
            };

            debug!(module = %name, "Starting module");
            module.initialize().await.map_err(|e| {
                error!(module = %name, error = %e, "Module failed to start");
                RegistryError::StartFailed {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;

            if let Some(entry) = self.state.write().modules.get_mut(name) {
                entry.started = true;
            }
            info!(module = %name, "Module started");
            started.push(name.clone());
        }

        Ok(started)
    }

    /// Clean up every registered module in shutdown order, best effort.
    ///
    /// Modules registered after the last startup-order computation are cleaned
    /// up after the ordered ones. Cleanup failures are logged and collected,
    /// never propagated, so every module gets its attempt.
    pub async fn stop_all(&self) -> ShutdownReport {
        let _guard = self.lifecycle.lock().await;

        let mut order = self.compute_shutdown_order().unwrap_or_else(|e| {
            error!(error = %e, "Falling back to reverse registration order for shutdown");
            self.names().into_iter().rev().collect()
        });
        for name in self.names().into_iter().rev() {
            if !order.contains(&name) {
                order.push(name);
            }
        }

        let mut report = ShutdownReport::default();
        for name in order {
            let Some(module) = self.get(&name) else {
                continue;
            };

            match module.cleanup().await {
                Ok(()) => {
                    debug!(module = %name, "Module cleaned up");
                    report.stopped.push(name.clone());
                }
                Err(e) => {
                    error!(module = %name, error = %e, "Module cleanup failed");
                    report.failures.push((name.clone(), e.to_string()));
                }
            }

            if let Some(entry) = self.state.write().modules.get_mut(&name) {
                entry.started = false;
            }
        }

        info!(
            stopped = report.stopped.len(),
            failures = report.failures.len(),
            "All modules stopped"
        );
        report
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
