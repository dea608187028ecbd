//! Services manager configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Startup-time settings of a [`ServicesManager`](crate::ServicesManager)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Number of worker threads running periodic callbacks
    pub scheduler_threads: usize,
    /// Seconds to wait for in-flight callbacks during shutdown
    pub shutdown_grace_secs: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            scheduler_threads: 2,
            shutdown_grace_secs: 10,
        }
    }
}

impl ManagerConfig {
    /// Parse from a YAML document; missing fields take their defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.scheduler_threads == 0 {
            return Err(Error::Config(
                "scheduler_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Bounded wait for worker quiescence at shutdown
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
