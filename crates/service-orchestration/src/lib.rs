//! # Service orchestration
//!
//! Dependency-driven lifecycle management for in-process services.
//!
//! Services are registered with a [`ServiceDescriptor`] and a constructor.
//! The [`ServicesManager`] keeps them pending until every declared
//! dependency is active, starts them, schedules their periodic callbacks on
//! a fixed-size worker pool and tears everything down on shutdown.
//!
//! ## Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use service_orchestration::{ManagerConfig, ServicesManager};
//! use service_registry::{Service, ServiceDescriptor};
//!
//! struct Configuration;
//!
//! #[async_trait]
//! impl Service for Configuration {
//!     async fn start(&self) -> anyhow::Result<()> { Ok(()) }
//!     async fn stop(&self) -> anyhow::Result<()> { Ok(()) }
//! }
//!
//! # fn main() -> anyhow::Result<()> {
//! smol::block_on(async {
//!     let manager = ServicesManager::new(ManagerConfig::default())?;
//!
//!     manager
//!         .register_service(ServiceDescriptor::new("configuration", "1.0.0"), || Ok(Configuration))
//!         .await?;
//!     assert!(manager.has_service("configuration"));
//!
//!     manager.shutdown().await;
//!     Ok(())
//! })
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod config;
mod context;
mod lifecycle;
mod manager;
mod resolver;
mod scheduler;

pub use config::ManagerConfig;
pub use context::{ConfigurationProvider, ServiceContext};
pub use lifecycle::LifecycleRunner;
pub use manager::{ManagerState, ServicesManager};
pub use resolver::{BlockedService, DependencyResolver, DrainReport};
pub use scheduler::Scheduler;

pub use service_registry::{
    DescribedService, Period, ScheduledTask, Service, ServiceDescriptor, ServiceHandle,
    ServiceInfo, TimeUnit,
};

use std::fmt;

/// Step of a service start that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    /// The constructor failed
    Construct,
    /// A declared periodic callback is invalid
    Schedule,
    /// The start hook failed
    Start,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            InitStage::Construct => "construct",
            InitStage::Schedule => "schedule tasks for",
            InitStage::Start => "start",
        };
        f.write_str(stage)
    }
}

/// Error types for orchestration operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Registration or lookup error from the registry
    #[error("Service registry error: {0}")]
    Registry(#[from] service_registry::Error),

    /// A service could not be constructed or started
    #[error("Failed to {stage} service {service}: {source}")]
    Initialization {
        /// Service name
        service: String,
        /// Step that failed
        stage: InitStage,
        /// Underlying cause
        #[source]
        source: anyhow::Error,
    },

    /// The manager no longer accepts registrations
    #[error("ServicesManager has been shut down")]
    ShutDown,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether the caller passed a malformed or duplicate registration
    pub fn is_registration(&self) -> bool {
        matches!(self, Error::Registry(e) if e.is_registration())
    }

    /// Whether a lookup missed
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Registry(e) if e.is_not_found())
    }

    /// Whether a service failed to construct or start
    pub fn is_initialization(&self) -> bool {
        matches!(self, Error::Initialization { .. })
    }
}

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, Error>;
