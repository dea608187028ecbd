//! Recording services shared by the orchestration integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use service_orchestration::{ManagerConfig, Period, ScheduledTask, Service, ServicesManager};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ordered log of lifecycle events, e.g. `start:a`, `stop:a`
#[derive(Clone, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Events with the given prefix, prefix stripped
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| event.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

/// Service that records its start and stop hooks
pub struct Recorder {
    pub name: String,
    pub journal: Journal,
    pub fail_start: bool,
    pub stop_fault: Option<StopFault>,
}

/// How a [`Recorder`] stop hook misbehaves
#[derive(Clone, Copy)]
pub enum StopFault {
    Error,
    Panic,
}

impl Recorder {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            fail_start: false,
            stop_fault: None,
        }
    }

    pub fn failing(name: &str, journal: &Journal) -> Self {
        Self {
            fail_start: true,
            ..Self::new(name, journal)
        }
    }

    pub fn faulty_stop(name: &str, journal: &Journal, fault: StopFault) -> Self {
        Self {
            stop_fault: Some(fault),
            ..Self::new(name, journal)
        }
    }
}

#[async_trait]
impl Service for Recorder {
    async fn start(&self) -> anyhow::Result<()> {
        self.journal.record(format!("start:{}", self.name));
        if self.fail_start {
            anyhow::bail!("{} refused to start", self.name);
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.journal.record(format!("stop:{}", self.name));
        match self.stop_fault {
            None => Ok(()),
            Some(StopFault::Error) => anyhow::bail!("{} failed to release its resources", self.name),
            Some(StopFault::Panic) => panic!("{} panicked while stopping", self.name),
        }
    }
}

/// Service whose start hook takes a while, recording when it begins and ends
pub struct Slow {
    pub name: String,
    pub journal: Journal,
}

#[async_trait]
impl Service for Slow {
    async fn start(&self) -> anyhow::Result<()> {
        self.journal.record(format!("begin:{}", self.name));
        smol::Timer::after(Duration::from_millis(50)).await;
        self.journal.record(format!("end:{}", self.name));
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Service with a 20ms callback that fails on its third invocation
pub struct Flaky {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Service for Flaky {
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn scheduled_tasks(&self) -> Vec<ScheduledTask> {
        vec![ScheduledTask::new::<Self, _, _>(
            "poll",
            Period::millis(20),
            |flaky| async move {
                let call = flaky.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call == 3 {
                    anyhow::bail!("upstream unavailable");
                }
                Ok(())
            },
        )]
    }
}

pub fn manager() -> ServicesManager {
    ServicesManager::new(ManagerConfig {
        scheduler_threads: 2,
        shutdown_grace_secs: 1,
    })
    .unwrap()
}
