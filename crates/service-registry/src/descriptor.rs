//! Static service metadata

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

fn default_description() -> String {
    "No description".to_string()
}

/// Identity and dependencies of a service.
///
/// Two descriptors are the same service when their names match, whatever
/// the other fields say. Equality and hashing only look at `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Unique key used for lookup and dependency resolution
    pub name: String,
    /// Human readable name, defaults to `name`
    #[serde(default)]
    pub display_name: String,
    /// Free-form description
    #[serde(default = "default_description")]
    pub description: String,
    /// Service version
    pub version: String,
    /// Names of services that must be active before this one starts
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ServiceDescriptor {
    /// Create a descriptor with no dependencies
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: default_description(),
            version: version.into(),
            dependencies: Vec::new(),
        }
    }

    /// Set the display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a dependency
    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Append several dependencies, preserving order
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Name shown in logs: the display name, or the key when none was set
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }

    /// Check the descriptor is well formed
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidDescriptor {
            service: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(invalid("name contains whitespace"));
        }
        if self.version.trim().is_empty() {
            return Err(invalid("version is empty"));
        }
        if self.dependencies.iter().any(|dep| dep.trim().is_empty()) {
            return Err(invalid("dependency name is empty"));
        }
        if self.dependencies.iter().any(|dep| dep == &self.name) {
            return Err(invalid("service depends on itself"));
        }

        Ok(())
    }
}

impl PartialEq for ServiceDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ServiceDescriptor {}

impl Hash for ServiceDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) v{}", self.label(), self.name, self.version)
    }
}
