//! File-backed configuration service
//!
//! Named configurations are YAML documents stored as `<name>.yaml` in a
//! single directory. The service indexes the directory when it starts and on
//! [`reload`](ConfigurationService::reload).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use service_orchestration::{ConfigurationProvider, Service, ServiceDescriptor};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

/// Name the configuration service registers under
pub const CONFIGURATION_SERVICE: &str = "configuration";

const EXTENSION: &str = "yaml";

/// Stores named YAML configurations in a directory
pub struct ConfigurationService {
    directory: PathBuf,
    known: RwLock<BTreeSet<String>>,
}

impl ConfigurationService {
    /// Create a service over `directory`. Nothing is read until it starts.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            known: RwLock::new(BTreeSet::new()),
        }
    }

    /// Descriptor used when registering the service
    pub fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new(CONFIGURATION_SERVICE, env!("CARGO_PKG_VERSION"))
            .with_display_name("Configuration")
            .with_description("Named YAML configurations stored on disk")
    }

    /// Directory holding the configuration files
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Whether a configuration with this name exists
    pub fn has_configuration(&self, name: &str) -> bool {
        self.known
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    /// Number of known configurations
    pub fn configuration_count(&self) -> usize {
        self.known.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Load and deserialize the configuration `name`
    pub fn load_configuration<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.path_for(name)?;
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse configuration {}", path.display()))
    }

    /// Write the default value of `T` as configuration `name` and return it
    pub fn create_configuration<T: Serialize + Default>(&self, name: &str) -> Result<T> {
        let config = T::default();
        self.save_configuration(name, &config)?;
        info!("Created default {} configuration", name);
        Ok(config)
    }

    /// Serialize `config` as configuration `name`, replacing any previous one
    pub fn save_configuration<T: Serialize>(&self, name: &str, config: &T) -> Result<()> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.directory).with_context(|| {
            format!(
                "Failed to create configuration directory {}",
                self.directory.display()
            )
        })?;

        let contents = serde_yaml::to_string(config)
            .with_context(|| format!("Failed to serialize {} configuration", name))?;
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write configuration {}", path.display()))?;

        self.known
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
        debug!("Saved configuration {} to {}", name, path.display());
        Ok(())
    }

    /// Re-index the configuration directory, returning how many were found
    pub fn reload(&self) -> Result<usize> {
        let mut found = BTreeSet::new();

        if self.directory.exists() {
            let entries = fs::read_dir(&self.directory).with_context(|| {
                format!(
                    "Failed to read configuration directory {}",
                    self.directory.display()
                )
            })?;

            for entry in entries {
                let path = entry?.path();
                if !path.is_file() || path.extension().is_none_or(|ext| ext != EXTENSION) {
                    continue;
                }
                if let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) {
                    found.insert(name.to_string());
                }
            }
        }

        let count = found.len();
        *self.known.write().unwrap_or_else(PoisonError::into_inner) = found;
        debug!("Indexed {} configurations in {}", count, self.directory.display());
        Ok(count)
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
            || name.chars().any(char::is_whitespace)
        {
            anyhow::bail!("Invalid configuration name: '{}'", name);
        }
        Ok(self.directory.join(format!("{}.{}", name, EXTENSION)))
    }
}

#[async_trait]
impl Service for ConfigurationService {
    async fn start(&self) -> Result<()> {
        fs::create_dir_all(&self.directory).with_context(|| {
            format!(
                "Failed to create configuration directory {}",
                self.directory.display()
            )
        })?;
        let count = self.reload()?;
        info!(
            "Found {} configurations in {}",
            count,
            self.directory.display()
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

impl ConfigurationProvider for ConfigurationService {
    fn has_configuration(&self, name: &str) -> bool {
        ConfigurationService::has_configuration(self, name)
    }

    fn load_value(&self, name: &str) -> Result<serde_yaml::Value> {
        self.load_configuration(name)
    }
}
