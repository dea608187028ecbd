//! Runtime-agnostic service registry
//!
//! This crate holds the data model of the service orchestration core:
//!
//! - [`ServiceDescriptor`]: name, version and dependency list of a service
//! - [`Service`]: the start/stop capability every registrable service implements,
//!   along with the periodic callbacks it declares ([`ScheduledTask`])
//! - [`ServiceRegistry`]: the pending and active service sets
//! - [`TaskHandle`]: cancellation handle for a scheduled callback
//!
//! Nothing here spawns work or depends on a specific async runtime.
//!
//! # Example
//!
//! ```
//! use service_registry::{PendingService, Service, ServiceDescriptor, ServiceRegistry};
//! use async_trait::async_trait;
//!
//! struct Database;
//!
//! #[async_trait]
//! impl Service for Database {
//!     async fn start(&self) -> anyhow::Result<()> { Ok(()) }
//!     async fn stop(&self) -> anyhow::Result<()> { Ok(()) }
//! }
//!
//! # smol::block_on(async {
//! let registry = ServiceRegistry::new();
//! let descriptor = ServiceDescriptor::new("database", "1.0.0").with_dependency("configuration");
//!
//! let mut guard = registry.lock().await;
//! guard.enqueue(PendingService::new(descriptor, || Ok(Database))).unwrap();
//! assert_eq!(guard.pending_names(), vec!["database"]);
//! # });
//! ```

#![warn(missing_docs)]

pub mod descriptor;
pub mod error;
pub mod registry;
pub mod service;
pub mod task;

pub use descriptor::ServiceDescriptor;
pub use error::{Error, Result};
pub use registry::{
    PendingService, RegistrationGuard, ServiceFactory, ServiceInfo, ServiceRegistry,
};
pub use service::{
    AsAnyArc, DescribedService, Period, ScheduledTask, Service, ServiceHandle, TimeUnit,
};
pub use task::{CancellationToken, TaskHandle};

/// Re-export key types for convenience
pub mod prelude {
    pub use crate::{
        DescribedService, Error, Period, Result, ScheduledTask, Service, ServiceDescriptor,
        ServiceHandle, TimeUnit,
    };
}
