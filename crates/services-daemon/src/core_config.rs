//! Core daemon configuration stored under the `core` name

use crate::configuration::ConfigurationService;
use serde::{Deserialize, Serialize};
use service_orchestration::{Period, ServiceContext};
use tracing::{info, warn};

/// Configuration name of [`CoreConfig`]
pub const CORE_CONFIGURATION: &str = "core";

const DEFAULT_STATUS_INTERVAL_SECS: u64 = 60;

/// Daemon-wide settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Enable debug logging
    pub debug: bool,
    /// Seconds between status reports
    pub status_interval_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            debug: false,
            status_interval_secs: DEFAULT_STATUS_INTERVAL_SECS,
        }
    }
}

impl CoreConfig {
    /// Load the core configuration, creating it with defaults if it does not
    /// exist. Any failure falls back to the defaults.
    pub fn load_or_create(context: &ServiceContext, configuration: &ConfigurationService) -> Self {
        if configuration.has_configuration(CORE_CONFIGURATION) {
            return context.configuration_or_default(CORE_CONFIGURATION);
        }

        info!("No core configuration found, creating defaults");
        configuration
            .create_configuration(CORE_CONFIGURATION)
            .unwrap_or_else(|e| {
                warn!("Failed to create core configuration, using defaults: {:#}", e);
                Self::default()
            })
    }

    /// Interval of the status report; zero falls back to the default
    pub fn status_period(&self) -> Period {
        if self.status_interval_secs == 0 {
            warn!(
                "status_interval_secs must be positive, using {}",
                DEFAULT_STATUS_INTERVAL_SECS
            );
            return Period::seconds(DEFAULT_STATUS_INTERVAL_SECS);
        }
        Period::seconds(self.status_interval_secs)
    }
}
