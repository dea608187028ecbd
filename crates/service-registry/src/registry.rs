//! Core service registry implementation
//!
//! The registry keeps two sets keyed by service name:
//!
//! - the **pending** set, services registered but not started yet, guarded by
//!   an async mutex that doubles as the registration lock;
//! - the **active** set, started services, behind a `RwLock` so lookups never
//!   wait for a registration cycle to finish.

use crate::{
    descriptor::ServiceDescriptor,
    error::{Error, Result},
    service::{Service, ServiceHandle},
    task::TaskHandle,
};
use chrono::{DateTime, Utc};
use futures::lock::{Mutex, MutexGuard};
use indexmap::IndexMap;
use serde::Serialize;
use std::any::type_name;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// One-shot constructor for a pending service
pub type ServiceFactory = Box<dyn FnOnce() -> anyhow::Result<ServiceHandle> + Send>;

/// A registered service waiting for its dependencies
pub struct PendingService {
    descriptor: ServiceDescriptor,
    factory: ServiceFactory,
}

impl PendingService {
    /// Wrap a typed constructor
    pub fn new<S, F>(descriptor: ServiceDescriptor, factory: F) -> Self
    where
        S: Service,
        F: FnOnce() -> anyhow::Result<S> + Send + 'static,
    {
        Self {
            descriptor,
            factory: Box::new(move || factory().map(|service| Arc::new(service) as ServiceHandle)),
        }
    }

    /// Service descriptor
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Split into descriptor and constructor
    pub fn into_parts(self) -> (ServiceDescriptor, ServiceFactory) {
        (self.descriptor, self.factory)
    }
}

impl std::fmt::Debug for PendingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingService")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// A started service
pub struct ServiceRecord {
    descriptor: ServiceDescriptor,
    instance: ServiceHandle,
    tasks: Vec<TaskHandle>,
    started_at: DateTime<Utc>,
}

/// Point-in-time view of an active service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    /// Service descriptor
    pub descriptor: ServiceDescriptor,
    /// When the service was promoted to active
    pub started_at: DateTime<Utc>,
    /// Number of periodic callbacks attached
    pub scheduled_tasks: usize,
}

impl ServiceRecord {
    fn info(&self) -> ServiceInfo {
        ServiceInfo {
            descriptor: self.descriptor.clone(),
            started_at: self.started_at,
            scheduled_tasks: self.tasks.len(),
        }
    }
}

/// Pending and active services
pub struct ServiceRegistry {
    active: RwLock<IndexMap<String, ServiceRecord>>,
    pending: Mutex<IndexMap<String, PendingService>>,
}

/// Exclusive access to the pending set for one registration cycle
pub struct RegistrationGuard<'a> {
    registry: &'a ServiceRegistry,
    pending: MutexGuard<'a, IndexMap<String, PendingService>>,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            active: RwLock::new(IndexMap::new()),
            pending: Mutex::new(IndexMap::new()),
        }
    }

    /// Acquire the registration lock.
    ///
    /// Waits for any registration cycle in progress. The lock is not
    /// reentrant.
    pub async fn lock(&self) -> RegistrationGuard<'_> {
        RegistrationGuard {
            registry: self,
            pending: self.pending.lock().await,
        }
    }

    fn read_active(&self) -> RwLockReadGuard<'_, IndexMap<String, ServiceRecord>> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_active(&self) -> RwLockWriteGuard<'_, IndexMap<String, ServiceRecord>> {
        self.active.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move a started service into the active set
    pub fn promote(&self, descriptor: ServiceDescriptor, instance: ServiceHandle) -> Result<()> {
        let mut active = self.write_active();
        if active.contains_key(&descriptor.name) {
            return Err(Error::ServiceExists(descriptor.name));
        }

        debug!("Promoting {} to active", descriptor.name);
        active.insert(
            descriptor.name.clone(),
            ServiceRecord {
                descriptor,
                instance,
                tasks: Vec::new(),
                started_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Attach scheduled task handles to an active service.
    ///
    /// If the service is gone the handles are dropped, which cancels them.
    pub fn attach_tasks(&self, name: &str, handles: Vec<TaskHandle>) -> Result<()> {
        let mut active = self.write_active();
        let record = active
            .get_mut(name)
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))?;
        record.tasks.extend(handles);
        Ok(())
    }

    /// Look up an active service
    pub fn get(&self, name: &str) -> Result<ServiceHandle> {
        self.read_active()
            .get(name)
            .map(|record| record.instance.clone())
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))
    }

    /// Look up an active service as a concrete type
    pub fn get_as<S: Service>(&self, name: &str) -> Result<Arc<S>> {
        self.get(name)?
            .into_any()
            .downcast::<S>()
            .map_err(|_| Error::TypeMismatch {
                service: name.to_string(),
                expected: type_name::<S>(),
            })
    }

    /// Whether a service is active
    pub fn contains(&self, name: &str) -> bool {
        self.read_active().contains_key(name)
    }

    /// Snapshot of every active instance, in start order
    pub fn all(&self) -> Vec<ServiceHandle> {
        self.read_active()
            .values()
            .map(|record| record.instance.clone())
            .collect()
    }

    /// Names of active services, in start order
    pub fn names(&self) -> Vec<String> {
        self.read_active().keys().cloned().collect()
    }

    /// Snapshot of one active service
    pub fn info(&self, name: &str) -> Result<ServiceInfo> {
        self.read_active()
            .get(name)
            .map(ServiceRecord::info)
            .ok_or_else(|| Error::ServiceNotFound(name.to_string()))
    }

    /// Snapshots of all active services, in start order
    pub fn infos(&self) -> Vec<ServiceInfo> {
        self.read_active().values().map(ServiceRecord::info).collect()
    }

    /// Number of active services
    pub fn len(&self) -> usize {
        self.read_active().len()
    }

    /// Whether no service is active
    pub fn is_empty(&self) -> bool {
        self.read_active().is_empty()
    }

    /// Cancel every scheduled task of every active service.
    ///
    /// Returns how many handles were newly cancelled.
    pub fn cancel_all_tasks(&self) -> usize {
        self.read_active()
            .values()
            .flat_map(|record| record.tasks.iter())
            .filter(|handle| handle.cancel())
            .count()
    }

    /// Active services in the order they should be stopped: dependents
    /// before their dependencies.
    pub fn shutdown_order(&self) -> Vec<(ServiceDescriptor, ServiceHandle)> {
        self.read_active()
            .values()
            .rev()
            .map(|record| (record.descriptor.clone(), record.instance.clone()))
            .collect()
    }

    /// Drop every active record, returning how many there were
    pub fn clear_active(&self) -> usize {
        let mut active = self.write_active();
        let count = active.len();
        active.clear();
        count
    }

    /// Names of services still waiting for dependencies.
    ///
    /// Waits for a registration cycle in progress.
    pub async fn pending_names(&self) -> Vec<String> {
        self.pending.lock().await.keys().cloned().collect()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistrationGuard<'_> {
    /// Validate and add a service to the pending set
    pub fn enqueue(&mut self, service: PendingService) -> Result<()> {
        let descriptor = service.descriptor();
        descriptor.validate()?;

        if self.pending.contains_key(&descriptor.name) || self.registry.contains(&descriptor.name) {
            return Err(Error::ServiceExists(descriptor.name.clone()));
        }

        debug!("Added {} to pending services", descriptor.name);
        self.pending.insert(descriptor.name.clone(), service);
        Ok(())
    }

    /// Names of pending services, in registration order
    pub fn pending_names(&self) -> Vec<String> {
        self.pending.keys().cloned().collect()
    }

    /// Descriptors of pending services, in registration order
    pub fn pending_descriptors(&self) -> Vec<ServiceDescriptor> {
        self.pending
            .values()
            .map(|service| service.descriptor.clone())
            .collect()
    }

    /// Descriptor of a pending service
    pub fn descriptor(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.pending.get(name).map(PendingService::descriptor)
    }

    /// Remove a pending service so it can be started
    pub fn take(&mut self, name: &str) -> Option<PendingService> {
        self.pending.shift_remove(name)
    }

    /// Number of pending services
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending service, returning how many there were
    pub fn clear(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// The registry this guard belongs to
    pub fn registry(&self) -> &ServiceRegistry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Period;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Service for Noop {
        async fn start(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Other;

    #[async_trait]
    impl Service for Other {
        async fn start(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn pending(name: &str) -> PendingService {
        PendingService::new(ServiceDescriptor::new(name, "1.0.0"), || Ok(Noop))
    }

    #[smol_potat::test]
    async fn test_enqueue_rejects_duplicates_across_sets() {
        let registry = ServiceRegistry::new();
        registry
            .promote(ServiceDescriptor::new("active", "1.0.0"), Arc::new(Noop))
            .unwrap();

        let mut guard = registry.lock().await;
        guard.enqueue(pending("waiting")).unwrap();

        let err = guard.enqueue(pending("waiting")).unwrap_err();
        assert!(matches!(err, Error::ServiceExists(ref name) if name == "waiting"));

        let err = guard.enqueue(pending("active")).unwrap_err();
        assert!(err.is_registration());

        assert_eq!(guard.pending_names(), vec!["waiting"]);
    }

    #[smol_potat::test]
    async fn test_enqueue_validates_descriptor() {
        let registry = ServiceRegistry::new();
        let mut guard = registry.lock().await;

        let err = guard.enqueue(pending("")).unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor { .. }));
        assert!(guard.is_empty());
    }

    #[smol_potat::test]
    async fn test_take_preserves_order_of_remaining() {
        let registry = ServiceRegistry::new();
        let mut guard = registry.lock().await;
        for name in ["a", "b", "c"] {
            guard.enqueue(pending(name)).unwrap();
        }

        let taken = guard.take("b").unwrap();
        assert_eq!(taken.descriptor().name, "b");
        assert!(guard.take("b").is_none());
        assert_eq!(guard.pending_names(), vec!["a", "c"]);
    }

    #[test]
    fn test_typed_lookup() {
        let registry = ServiceRegistry::new();
        registry
            .promote(ServiceDescriptor::new("noop", "1.0.0"), Arc::new(Noop))
            .unwrap();

        assert!(registry.get_as::<Noop>("noop").is_ok());
        assert!(matches!(
            registry.get_as::<Other>("noop"),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(registry.get("missing"), Err(e) if e.is_not_found()));
    }

    #[test]
    fn test_promote_twice_fails() {
        let registry = ServiceRegistry::new();
        let descriptor = ServiceDescriptor::new("noop", "1.0.0");
        registry.promote(descriptor.clone(), Arc::new(Noop)).unwrap();
        assert!(registry.promote(descriptor, Arc::new(Noop)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_task_handles_are_cancelled_once() {
        let registry = ServiceRegistry::new();
        registry
            .promote(ServiceDescriptor::new("noop", "1.0.0"), Arc::new(Noop))
            .unwrap();

        let (first, first_token) = TaskHandle::new("noop", "first", Period::seconds(1));
        let (second, _second_token) = TaskHandle::new("noop", "second", Period::seconds(1));
        registry.attach_tasks("noop", vec![first, second]).unwrap();
        assert_eq!(registry.info("noop").unwrap().scheduled_tasks, 2);

        assert_eq!(registry.cancel_all_tasks(), 2);
        assert_eq!(registry.cancel_all_tasks(), 0);
        assert!(first_token.is_cancelled());

        let (orphan, orphan_token) = TaskHandle::new("gone", "tick", Period::seconds(1));
        assert!(registry.attach_tasks("gone", vec![orphan]).is_err());
        assert!(orphan_token.is_cancelled());
    }

    #[test]
    fn test_shutdown_order_is_reverse_start_order() {
        let registry = ServiceRegistry::new();
        for name in ["configuration", "database", "library"] {
            registry
                .promote(ServiceDescriptor::new(name, "1.0.0"), Arc::new(Noop))
                .unwrap();
        }

        let order: Vec<String> = registry
            .shutdown_order()
            .into_iter()
            .map(|(descriptor, _)| descriptor.name)
            .collect();
        assert_eq!(order, vec!["library", "database", "configuration"]);

        assert_eq!(registry.clear_active(), 3);
        assert!(registry.all().is_empty());
    }
}
