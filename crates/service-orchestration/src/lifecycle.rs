//! Service start sequence: construct, start, promote, schedule.

use crate::{Error, InitStage, Result, scheduler::Scheduler};
use futures::FutureExt;
use service_registry::{PendingService, ServiceHandle, ServiceRegistry};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Starts pending services and wires their periodic callbacks
pub struct LifecycleRunner {
    registry: Arc<ServiceRegistry>,
    scheduler: Arc<Scheduler>,
}

impl LifecycleRunner {
    /// Create a runner over a registry and scheduler
    pub fn new(registry: Arc<ServiceRegistry>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            registry,
            scheduler,
        }
    }

    /// Construct and start a service, then make it active.
    ///
    /// On a failed start the stop hook is invoked as cleanup and the
    /// original failure is returned. The service ends up in neither the
    /// pending nor the active set.
    pub async fn start(&self, service: PendingService) -> Result<()> {
        let (descriptor, factory) = service.into_parts();
        let name = descriptor.name.clone();
        let label = descriptor.label().to_string();
        let init_error = |stage, source| Error::Initialization {
            service: name.clone(),
            stage,
            source,
        };

        info!("Loading {} ({})...", label, name);

        let instance: ServiceHandle = match std::panic::catch_unwind(AssertUnwindSafe(factory)) {
            Ok(Ok(instance)) => instance,
            Ok(Err(e)) => {
                error!("Failed to initialize service ({}): {:#}", name, e);
                return Err(init_error(InitStage::Construct, e));
            }
            Err(payload) => {
                let e = panic_error(payload);
                error!("Failed to initialize service ({}): {:#}", name, e);
                return Err(init_error(InitStage::Construct, e));
            }
        };

        let tasks = instance.scheduled_tasks();
        if let Some(task) = tasks.iter().find(|task| task.period().is_zero()) {
            let e = anyhow::anyhow!("scheduled task '{}' has a zero period", task.name());
            error!("Failed to schedule tasks of service ({}): {}", name, e);
            return Err(init_error(InitStage::Schedule, e));
        }

        debug!("Starting {} ({})...", label, name);
        if let Err(e) = guarded(instance.start()).await {
            error!("Failed to start service ({}): {:#}", name, e);
            stop_quietly(&name, &instance).await;
            return Err(init_error(InitStage::Start, e));
        }

        // Promote before scheduling so callbacks can look their service up.
        if let Err(e) = self.registry.promote(descriptor, instance.clone()) {
            stop_quietly(&name, &instance).await;
            return Err(e.into());
        }

        if !tasks.is_empty() {
            let handles = tasks
                .into_iter()
                .map(|task| {
                    debug!(
                        "Scheduled task {} of service {} every {}",
                        task.name(),
                        name,
                        task.period()
                    );
                    self.scheduler.schedule(&name, task)
                })
                .collect();
            self.registry.attach_tasks(&name, handles)?;
        }

        info!("Loaded {} ({})", label, name);
        Ok(())
    }
}

async fn stop_quietly(name: &str, instance: &ServiceHandle) {
    if let Err(e) = guarded(instance.stop()).await {
        warn!("Error while stopping failed service ({}): {:#}", name, e);
    }
}

/// Await a service hook, turning a panic into an error
pub(crate) async fn guarded<F>(hook: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(hook).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(panic_error(payload)),
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    anyhow::anyhow!("panicked: {}", message)
}
