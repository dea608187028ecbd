//! Built-in service that periodically reports what the manager runs

use crate::configuration::CONFIGURATION_SERVICE;
use async_trait::async_trait;
use comfy_table::{Cell, Color, Table};
use service_orchestration::{
    Period, ScheduledTask, Service, ServiceContext, ServiceDescriptor, ServiceInfo,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Name the status service registers under
pub const STATUS_SERVICE: &str = "status";

/// Logs the number of active services at a fixed interval
pub struct StatusService {
    context: ServiceContext,
    period: Period,
    reports: AtomicU64,
}

impl StatusService {
    /// Create a status service reporting every `period`
    pub fn new(context: ServiceContext, period: Period) -> Self {
        Self {
            context,
            period,
            reports: AtomicU64::new(0),
        }
    }

    /// Descriptor used when registering the service
    pub fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new(STATUS_SERVICE, env!("CARGO_PKG_VERSION"))
            .with_display_name("Status")
            .with_description("Periodic report of active services")
            .with_dependency(CONFIGURATION_SERVICE)
    }

    /// Log one report and return the active service count
    pub fn report(&self) -> usize {
        let active = self.context.manager().list_services().len();
        self.reports.fetch_add(1, Ordering::SeqCst);
        info!("{} services active", active);
        active
    }

    /// Number of reports logged so far
    pub fn reports(&self) -> u64 {
        self.reports.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Service for StatusService {
    async fn start(&self) -> anyhow::Result<()> {
        debug!("Reporting status every {}", self.period);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        debug!("Status service stopped after {} reports", self.reports());
        Ok(())
    }

    fn scheduled_tasks(&self) -> Vec<ScheduledTask> {
        vec![ScheduledTask::new::<Self, _, _>(
            "report",
            self.period,
            |status| async move {
                status.report();
                Ok(())
            },
        )]
    }
}

/// Render active services as a table
pub fn services_table(services: &[ServiceInfo]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["SERVICE", "NAME", "VERSION", "TASKS", "STARTED"]);

    for info in services {
        table.add_row(vec![
            Cell::new(info.descriptor.label()),
            Cell::new(&info.descriptor.name).fg(Color::Green),
            Cell::new(&info.descriptor.version),
            Cell::new(info.scheduled_tasks),
            Cell::new(info.started_at.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }

    table
}
