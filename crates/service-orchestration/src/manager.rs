//! Services manager façade.
//!
//! The ServicesManager is the public surface of the orchestration core: it
//! registers services, answers lookups and owns the shutdown sequence.

use crate::{
    Error, Result,
    config::ManagerConfig,
    lifecycle::{LifecycleRunner, guarded},
    resolver::DependencyResolver,
    scheduler::Scheduler,
};
use service_registry::{
    DescribedService, PendingService, Service, ServiceDescriptor, ServiceHandle, ServiceInfo,
    ServiceRegistry,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Lifecycle state of the manager itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Accepting registrations
    Running,
    /// Shutdown started; terminal
    ShuttingDown,
}

/// Central service orchestrator
pub struct ServicesManager {
    config: ManagerConfig,
    registry: Arc<ServiceRegistry>,
    scheduler: Arc<Scheduler>,
    runner: LifecycleRunner,
    resolver: DependencyResolver,
    shutting_down: AtomicBool,
}

impl ServicesManager {
    /// Create a manager and start its scheduler workers
    pub fn new(config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Initializing ServicesManager with {} scheduler threads",
            config.scheduler_threads
        );

        let registry = Arc::new(ServiceRegistry::new());
        let scheduler = Arc::new(Scheduler::new(
            config.scheduler_threads,
            registry.clone(),
        )?);
        let runner = LifecycleRunner::new(registry.clone(), scheduler.clone());

        Ok(Self {
            config,
            registry,
            scheduler,
            runner,
            resolver: DependencyResolver::new(),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Register a service and start everything whose dependencies are met.
    ///
    /// Registration cycles are serialized. The call returns once every
    /// service that could start has been started. It fails if the
    /// registration is malformed or a duplicate, or if this service itself
    /// fails to start; other services failing as a side effect are only
    /// logged.
    pub async fn register_service<S, F>(&self, descriptor: ServiceDescriptor, factory: F) -> Result<()>
    where
        S: Service,
        F: FnOnce() -> anyhow::Result<S> + Send + 'static,
    {
        self.ensure_running()?;
        let mut guard = self.registry.lock().await;
        // Shutdown may have started while we waited for the lock.
        self.ensure_running()?;

        let name = descriptor.name.clone();
        let label = descriptor.label().to_string();

        if let Err(e) = guard.enqueue(PendingService::new(descriptor, factory)) {
            error!("Trying to register service {} but it was rejected: {}", name, e);
            return Err(e.into());
        }
        info!("Registering {} ({})...", label, name);

        let mut report = self.resolver.drain(&mut guard, &self.runner).await;
        if !report.started.is_empty() {
            debug!("Started {} services: {}", report.started.len(), report.started.join(", "));
        }

        match report.take_failure(&name) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Register a service type that describes and constructs itself
    pub async fn register<S: DescribedService>(&self) -> Result<()> {
        self.register_service(S::descriptor(), S::create).await
    }

    /// Look up an active service
    pub fn get_service(&self, name: &str) -> Result<ServiceHandle> {
        Ok(self.registry.get(name)?)
    }

    /// Look up an active service as a concrete type
    pub fn get_service_as<S: Service>(&self, name: &str) -> Result<Arc<S>> {
        Ok(self.registry.get_as::<S>(name)?)
    }

    /// Whether a service is active
    pub fn has_service(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Snapshot of active services, in start order
    pub fn list_services(&self) -> Vec<ServiceHandle> {
        self.registry.all()
    }

    /// Descriptors and start times of active services, in start order
    pub fn service_info(&self) -> Vec<ServiceInfo> {
        self.registry.infos()
    }

    /// Names of services still waiting for dependencies
    pub async fn pending_services(&self) -> Vec<String> {
        self.registry.pending_names().await
    }

    /// Current manager state
    pub fn state(&self) -> ManagerState {
        if self.shutting_down.load(Ordering::SeqCst) {
            ManagerState::ShuttingDown
        } else {
            ManagerState::Running
        }
    }

    /// Manager configuration
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Scheduler running periodic callbacks
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state() {
            ManagerState::Running => Ok(()),
            ManagerState::ShuttingDown => Err(Error::ShutDown),
        }
    }

    /// Stop every service and the scheduler.
    ///
    /// Cancels all scheduled tasks, stops services in reverse start order
    /// (failures are logged and do not abort the sequence), waits up to the
    /// configured grace period for callbacks to finish, then clears both
    /// service sets. Only the first call does anything.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            warn!("Services manager shutdown already requested");
            return;
        }

        info!("Shutting down services manager...");
        let mut guard = self.registry.lock().await;

        let cancelled = self.registry.cancel_all_tasks();
        debug!("Cancelled {} scheduled tasks", cancelled);

        for (descriptor, service) in self.registry.shutdown_order() {
            debug!("Stopping {} ({})...", descriptor.label(), descriptor.name);
            if let Err(e) = guarded(service.stop()).await {
                warn!("Error stopping service ({}): {:#}", descriptor.name, e);
            }
        }

        if !self.scheduler.shutdown(self.config.shutdown_grace()).await {
            warn!("Scheduler did not quiesce, some callbacks were abandoned");
        }

        let discarded = guard.clear();
        if discarded > 0 {
            debug!("Discarded {} pending services", discarded);
        }
        self.registry.clear_active();

        info!("Services manager shutdown complete");
    }
}
