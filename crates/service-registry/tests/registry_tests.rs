//! Integration tests for the pending and active service sets

use async_trait::async_trait;
use service_registry::{
    PendingService, Period, ScheduledTask, Service, ServiceDescriptor, ServiceRegistry,
    TaskHandle,
};
use std::sync::Arc;
use std::time::Duration;

struct Gateway;

#[async_trait]
impl Service for Gateway {
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn scheduled_tasks(&self) -> Vec<ScheduledTask> {
        vec![ScheduledTask::new::<Self, _, _>(
            "heartbeat",
            Period::seconds(30),
            |_| async { Ok(()) },
        )]
    }
}

#[smol_potat::test]
async fn test_lookups_do_not_wait_for_registration() {
    let registry = Arc::new(ServiceRegistry::new());
    registry
        .promote(ServiceDescriptor::new("gateway", "1.0.0"), Arc::new(Gateway))
        .unwrap();

    let guard = registry.lock().await;

    let reader = registry.clone();
    let lookup = smol::unblock(move || reader.contains("gateway") && reader.get("gateway").is_ok());
    let found = smol::future::or(lookup, async {
        smol::Timer::after(Duration::from_secs(5)).await;
        false
    })
    .await;

    assert!(found);
    drop(guard);
}

#[smol_potat::test]
async fn test_pending_names_wait_for_cycle() {
    let registry = Arc::new(ServiceRegistry::new());
    let mut guard = registry.lock().await;
    guard
        .enqueue(PendingService::new(
            ServiceDescriptor::new("library", "1.0.0").with_dependency("database"),
            || Ok(Gateway),
        ))
        .unwrap();

    let waiting = {
        let registry = registry.clone();
        smol::spawn(async move { registry.pending_names().await })
    };
    smol::Timer::after(Duration::from_millis(20)).await;
    guard
        .enqueue(PendingService::new(
            ServiceDescriptor::new("database", "1.0.0"),
            || Ok(Gateway),
        ))
        .unwrap();
    drop(guard);

    assert_eq!(waiting.await, vec!["library", "database"]);
}

#[test]
fn test_info_snapshot_serializes() {
    let registry = ServiceRegistry::new();
    let gateway = Arc::new(Gateway);
    registry
        .promote(
            ServiceDescriptor::new("gateway", "3.2.0")
                .with_display_name("Gateway")
                .with_dependency("configuration"),
            gateway.clone(),
        )
        .unwrap();

    let (handles, tokens): (Vec<TaskHandle>, Vec<_>) = gateway
        .scheduled_tasks()
        .iter()
        .map(|task| TaskHandle::new("gateway", task.name(), task.period()))
        .unzip();
    registry.attach_tasks("gateway", handles).unwrap();

    let info = registry.info("gateway").unwrap();
    assert_eq!(info.scheduled_tasks, 1);

    let yaml = serde_yaml::to_string(&info).unwrap();
    assert!(yaml.contains("name: gateway"));
    assert!(yaml.contains("version: 3.2.0"));
    assert!(yaml.contains("- configuration"));
    assert!(yaml.contains("started_at:"));

    assert_eq!(registry.cancel_all_tasks(), 1);
    assert_eq!(registry.cancel_all_tasks(), 0);
    assert!(tokens.iter().all(|token| token.is_cancelled()));
    assert!(registry.attach_tasks("missing", Vec::new()).unwrap_err().is_not_found());
}
