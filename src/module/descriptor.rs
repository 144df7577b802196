//! Module descriptors: identity, declared dependencies and the bound implementation.

use super::version::parse_version;
use super::ProtocolModule;
use crate::error::RegistryResult;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One declared dependency of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDependency {
    pub name: String,
    pub min_version: Option<Version>,
    pub optional: bool,
}

impl ModuleDependency {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_version: None,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min_version: None,
            optional: true,
        }
    }

    pub fn with_min_version(mut self, version: &str) -> RegistryResult<Self> {
        self.min_version = Some(parse_version(version)?);
        Ok(self)
    }
}

/// Registration record for a module. Immutable once registered.
#[derive(Clone)]
pub struct ModuleDescriptor {
    pub name: String,
    pub version: Version,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub dependencies: Vec<ModuleDependency>,
    pub module: Arc<dyn ProtocolModule>,
}

impl ModuleDescriptor {
    /// Descriptor named after the module itself, version `1.0.0`, no dependencies.
    pub fn new(module: Arc<dyn ProtocolModule>) -> Self {
        Self {
            name: module.name().to_string(),
            version: Version::new(1, 0, 0),
            description: None,
            tags: Vec::new(),
            dependencies: Vec::new(),
            module,
        }
    }

    pub fn with_version(mut self, version: &str) -> RegistryResult<Self> {
        self.version = parse_version(version)?;
        Ok(self)
    }

    pub fn with_dependency(mut self, dependency: ModuleDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn depends_on(self, name: impl Into<String>) -> Self {
        self.with_dependency(ModuleDependency::required(name))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn dependency_names(&self) -> Vec<String> {
        self.dependencies.iter().map(|d| d.name.clone()).collect()
    }
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("version", &self.version.to_string())
            .field("dependencies", &self.dependencies)
            .field("tags", &self.tags)
            .field("module", &"<Arc<dyn ProtocolModule>>")
            .finish()
    }
}

/// Serialisable view of a descriptor, without the module handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorInfo {
    pub name: String,
    pub version: Version,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub dependencies: Vec<ModuleDependency>,
}

impl From<&ModuleDescriptor> for DescriptorInfo {
    fn from(descriptor: &ModuleDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            version: descriptor.version.clone(),
            description: descriptor.description.clone(),
            tags: descriptor.tags.clone(),
            dependencies: descriptor.dependencies.clone(),
        }
    }
}
