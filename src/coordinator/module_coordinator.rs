//! Module Coordinator: batches module adapters and installs them into an orchestrator.

use crate::error::{OrchestrationResult, RegistryError, RegistryResult};
use crate::module::{
    is_version_compatible, DescriptorInfo, ModuleDependency, ModuleDescriptor, ProtocolModule,
};
use crate::orchestration::CoreOrchestrator;
use crate::registry::{DependencyGraph, ModuleRegistry};
use semver::Version;
use std::sync::Arc;
use tracing::{info, warn};

/// Collects module descriptors and registers them in dependency order.
#[derive(Debug, Default)]
pub struct ModuleCoordinator {
    pending: Vec<ModuleDescriptor>,
    installed: Vec<DescriptorInfo>,
}

impl ModuleCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a module with its version and required dependencies.
    /// Fails with [`RegistryError::DuplicateModule`] when the name is already queued.
    pub fn add(
        &mut self,
        module: Arc<dyn ProtocolModule>,
        version: &str,
        dependencies: &[&str],
    ) -> RegistryResult<&mut Self> {
        let mut descriptor = ModuleDescriptor::new(module).with_version(version)?;
        for dependency in dependencies {
            descriptor = descriptor.with_dependency(ModuleDependency::required(*dependency));
        }
        self.add_descriptor(descriptor)
    }

    pub fn add_descriptor(&mut self, descriptor: ModuleDescriptor) -> RegistryResult<&mut Self> {
        if self.pending.iter().any(|queued| queued.name == descriptor.name) {
            warn!(module = %descriptor.name, "Rejected duplicate module in coordinator batch");
            return Err(RegistryError::DuplicateModule {
                name: descriptor.name,
            });
        }
        self.pending.push(descriptor);
        Ok(self)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Register every queued module with `orchestrator`.
    ///
    /// Queued modules are ordered among themselves so callers may add them in
    /// any order. The whole batch is checked against the registry first: a
    /// cycle, a name that is already registered, a missing required dependency
    /// or an unmet version floor fails before anything is registered, and the
    /// batch stays queued. A module that fails later stays queued together with
    /// everything after it.
    pub async fn install(&mut self, orchestrator: &CoreOrchestrator) -> OrchestrationResult<()> {
        let order = self.validate_batch(orchestrator.registry())?;

        for name in order {
            // Nodes created only as dependency targets have no descriptor here.
            let Some(position) = self.pending.iter().position(|d| d.name == name) else {
                continue;
            };
            let descriptor = self.pending[position].clone();
            let info = DescriptorInfo::from(&descriptor);
            orchestrator.register_module(descriptor).await?;
            self.pending.remove(position);
            self.installed.push(info);
        }

        info!(installed = self.installed.len(), "Module coordinator installed modules");
        Ok(())
    }

    /// Installation order for the queued batch, or the first reason it cannot be registered.
    fn validate_batch(&self, registry: &ModuleRegistry) -> RegistryResult<Vec<String>> {
        let mut graph = DependencyGraph::new();
        for descriptor in &self.pending {
            graph.add_node(&descriptor.name, descriptor.dependency_names());
        }
        let order = graph.topological_order()?;

        let available_version = |name: &str| -> Option<Version> {
            self.pending
                .iter()
                .find(|d| d.name == name)
                .map(|d| d.version.clone())
                .or_else(|| registry.descriptor(name).map(|info| info.version))
        };

        for descriptor in &self.pending {
            if registry.contains(&descriptor.name) {
                return Err(RegistryError::DuplicateModule {
                    name: descriptor.name.clone(),
                });
            }
            for dependency in &descriptor.dependencies {
                match available_version(&dependency.name) {
                    None if dependency.optional => {}
                    None => {
                        return Err(RegistryError::MissingDependency {
                            module: descriptor.name.clone(),
                            dependency: dependency.name.clone(),
                        });
                    }
                    Some(available) => {
                        if let Some(required) = &dependency.min_version {
                            if !is_version_compatible(&available, required) {
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
        }
        Ok(order)
    }

    /// Modules installed by this coordinator, in installation order.
    pub fn discover(&self) -> Vec<DescriptorInfo> {
        self.installed.clone()
    }
}
