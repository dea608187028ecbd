//! Explicit context handed to services
//!
//! Services that need the manager or typed configuration receive a
//! [`ServiceContext`] at construction instead of reaching for a global.

use crate::{Error, Result, manager::ServicesManager};
use serde::de::DeserializeOwned;
use service_registry::Service;
use std::sync::Arc;
use tracing::warn;

/// Source of named configuration documents
pub trait ConfigurationProvider: Send + Sync {
    /// Whether a configuration with this name exists
    fn has_configuration(&self, name: &str) -> bool;

    /// Load the raw document for `name`
    fn load_value(&self, name: &str) -> anyhow::Result<serde_yaml::Value>;
}

/// Runtime dependencies shared by services
#[derive(Clone)]
pub struct ServiceContext {
    manager: Arc<ServicesManager>,
    configuration: Option<Arc<dyn ConfigurationProvider>>,
}

impl ServiceContext {
    /// Create a context without a configuration provider
    pub fn new(manager: Arc<ServicesManager>) -> Self {
        Self {
            manager,
            configuration: None,
        }
    }

    /// Attach a configuration provider
    pub fn with_configuration(mut self, provider: Arc<dyn ConfigurationProvider>) -> Self {
        self.configuration = Some(provider);
        self
    }

    /// The services manager
    pub fn manager(&self) -> &Arc<ServicesManager> {
        &self.manager
    }

    /// Typed lookup of an active service
    pub fn service<S: Service>(&self, name: &str) -> Result<Arc<S>> {
        self.manager.get_service_as::<S>(name)
    }

    /// Load and deserialize the configuration named `name`
    pub fn configuration<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let provider = self
            .configuration
            .as_ref()
            .ok_or_else(|| Error::Config("no configuration provider attached".to_string()))?;

        if !provider.has_configuration(name) {
            return Err(Error::Config(format!("configuration '{}' not found", name)));
        }

        let value = provider
            .load_value(name)
            .map_err(|e| Error::Config(format!("failed to load '{}': {:#}", name, e)))?;
        Ok(serde_yaml::from_value(value)?)
    }

    /// Like [`configuration`](Self::configuration), falling back to defaults
    pub fn configuration_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        match self.configuration(name) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load {} configuration, using defaults: {}", name, e);
                T::default()
            }
        }
    }
}
