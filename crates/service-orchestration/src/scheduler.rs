//! Fixed-size worker pool running periodic service callbacks.
//!
//! Every scheduled callback is a task loop on a shared [`smol::Executor`]
//! driven by `N` dedicated worker threads. A loop ticks at a fixed rate,
//! looks its owning service up in the registry and invokes the callback.
//! Failures and panics are logged and never end the loop; only the
//! cancellation token does.

use crate::{Error, Result, lifecycle::guarded};
use async_channel::{Receiver, Sender};
use service_registry::{
    CancellationToken, ScheduledTask, ServiceRegistry, TaskHandle,
};
use smol::stream::StreamExt;
use smol::{Executor, Task, Timer};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// Worker pool for periodic callbacks
pub struct Scheduler {
    executor: Arc<Executor<'static>>,
    registry: Arc<ServiceRegistry>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    loops: Mutex<Vec<Task<()>>>,
    /// Closing this channel stops the workers
    stop: Sender<()>,
    /// Each task loop holds a clone; `None` once shutdown started
    live: Mutex<Option<Sender<()>>>,
    /// Closes when every loop (and `live`) has been dropped
    quiesced: Receiver<()>,
    worker_count: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Scheduler {
    /// Start `threads` worker threads
    pub fn new(threads: usize, registry: Arc<ServiceRegistry>) -> Result<Self> {
        if threads == 0 {
            return Err(Error::Config(
                "scheduler needs at least one worker thread".to_string(),
            ));
        }

        let executor = Arc::new(Executor::new());
        let (stop, stop_rx) = async_channel::bounded::<()>(1);

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let executor = executor.clone();
            let stop_rx = stop_rx.clone();
            // On error the local `stop` sender is dropped, releasing workers already spawned.
            let worker = thread::Builder::new()
                .name(format!("scheduler-worker-{index}"))
                .spawn(move || {
                    smol::block_on(executor.run(async move {
                        let _ = stop_rx.recv().await;
                    }))
                })?;
            workers.push(worker);
        }

        let (live, quiesced) = async_channel::bounded(1);
        debug!("Scheduler started with {} worker threads", threads);

        Ok(Self {
            executor,
            registry,
            workers: Mutex::new(workers),
            loops: Mutex::new(Vec::new()),
            stop,
            live: Mutex::new(Some(live)),
            quiesced,
            worker_count: threads,
        })
    }

    /// Run `task` for `service` at a fixed rate, starting now.
    ///
    /// After shutdown the returned handle is already cancelled and nothing
    /// runs.
    pub fn schedule(&self, service: &str, task: ScheduledTask) -> TaskHandle {
        let (handle, token) = TaskHandle::new(service, task.name(), task.period());

        let Some(live) = lock(&self.live).clone() else {
            warn!(
                "Scheduler is shut down, not scheduling task {} of service {}",
                task.name(),
                service
            );
            handle.cancel();
            return handle;
        };

        let runner = TaskLoop {
            registry: self.registry.clone(),
            service: service.to_string(),
            task,
            token,
            _live: live,
        };

        let spawned = self.executor.spawn(runner.run());
        let mut loops = lock(&self.loops);
        loops.retain(|task| !task.is_finished());
        loops.push(spawned);

        handle
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Number of task loops that have not exited yet
    pub fn active_tasks(&self) -> usize {
        lock(&self.loops)
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Stop the pool.
    ///
    /// Task handles should be cancelled first. Waits up to `grace` for every
    /// task loop to exit, then stops the workers and drops whatever is still
    /// running. Returns whether all loops exited in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let Some(live) = lock(&self.live).take() else {
            debug!("Scheduler already shut down");
            return true;
        };
        drop(live);

        let quiesced = smol::future::or(
            async {
                // Nothing is ever sent; this resolves when the last loop is gone.
                let _ = self.quiesced.recv().await;
                true
            },
            async {
                Timer::after(grace).await;
                false
            },
        )
        .await;

        if !quiesced {
            warn!(
                "Scheduled tasks did not finish within {:?}, forcing cancellation",
                grace
            );
        }

        self.stop.close();
        let abandoned = std::mem::take(&mut *lock(&self.loops));
        drop(abandoned);

        let workers = std::mem::take(&mut *lock(&self.workers));
        if quiesced {
            for worker in workers {
                if smol::unblock(move || worker.join()).await.is_err() {
                    warn!("Scheduler worker thread panicked");
                }
            }
        }

        debug!("Scheduler stopped");
        quiesced
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop.close();
    }
}

struct TaskLoop {
    registry: Arc<ServiceRegistry>,
    service: String,
    task: ScheduledTask,
    token: CancellationToken,
    _live: Sender<()>,
}

impl TaskLoop {
    async fn run(self) {
        let mut ticks = Timer::interval_at(Instant::now(), self.task.period().as_duration());

        loop {
            let fired = smol::future::or(
                async {
                    self.token.cancelled().await;
                    false
                },
                async {
                    ticks.next().await;
                    true
                },
            )
            .await;

            if !fired || self.token.is_cancelled() {
                break;
            }

            self.invoke().await;
        }

        debug!(
            "Scheduled task {} of service {} stopped",
            self.task.name(),
            self.service
        );
    }

    async fn invoke(&self) {
        let service = match self.registry.get(&self.service) {
            Ok(service) => service,
            Err(e) => {
                warn!(
                    service = %self.service,
                    task = self.task.name(),
                    "Skipping scheduled task: {}",
                    e
                );
                return;
            }
        };

        trace!("Running task {} of service {}", self.task.name(), self.service);
        if let Err(e) = guarded(self.task.invoke(service)).await {
            error!(
                service = %self.service,
                task = self.task.name(),
                "Failed to execute scheduled task ({} at {}): {:#}",
                self.service,
                self.task.name(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use service_registry::{Period, Service, ServiceDescriptor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Ticker {
        ticks: AtomicUsize,
    }

    #[async_trait]
    impl Service for Ticker {
        async fn start(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn tick_task() -> ScheduledTask {
        ScheduledTask::new::<Ticker, _, _>("tick", Period::millis(20), |ticker| async move {
            ticker.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn setup() -> (Arc<ServiceRegistry>, Arc<Ticker>) {
        let registry = Arc::new(ServiceRegistry::new());
        let ticker = Arc::new(Ticker {
            ticks: AtomicUsize::new(0),
        });
        registry
            .promote(ServiceDescriptor::new("ticker", "1.0.0"), ticker.clone())
            .unwrap();
        (registry, ticker)
    }

    #[test]
    fn test_zero_threads_rejected() {
        let registry = Arc::new(ServiceRegistry::new());
        assert!(matches!(
            Scheduler::new(0, registry),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_runs_immediately_and_repeats() {
        smol::block_on(async {
            let (registry, ticker) = setup();
            let scheduler = Scheduler::new(2, registry).unwrap();
            assert_eq!(scheduler.worker_count(), 2);

            let handle = scheduler.schedule("ticker", tick_task());
            Timer::after(Duration::from_millis(10)).await;
            assert!(ticker.ticks.load(Ordering::SeqCst) >= 1);

            Timer::after(Duration::from_millis(100)).await;
            assert!(ticker.ticks.load(Ordering::SeqCst) >= 3);

            handle.cancel();
            assert!(scheduler.shutdown(Duration::from_secs(1)).await);
        });
    }

    #[test]
    fn test_cancel_stops_invocations() {
        smol::block_on(async {
            let (registry, ticker) = setup();
            let scheduler = Scheduler::new(1, registry).unwrap();

            let handle = scheduler.schedule("ticker", tick_task());
            Timer::after(Duration::from_millis(50)).await;
            handle.cancel();
            Timer::after(Duration::from_millis(30)).await;

            let after_cancel = ticker.ticks.load(Ordering::SeqCst);
            Timer::after(Duration::from_millis(100)).await;
            assert_eq!(ticker.ticks.load(Ordering::SeqCst), after_cancel);
            assert_eq!(scheduler.active_tasks(), 0);
        });
    }

    #[test]
    fn test_missing_service_is_skipped() {
        smol::block_on(async {
            let registry = Arc::new(ServiceRegistry::new());
            let scheduler = Scheduler::new(1, registry).unwrap();

            let handle = scheduler.schedule("ghost", tick_task());
            Timer::after(Duration::from_millis(50)).await;
            assert_eq!(scheduler.active_tasks(), 1);

            handle.cancel();
            assert!(scheduler.shutdown(Duration::from_secs(1)).await);
        });
    }

    #[test]
    fn test_shutdown_without_cancel_forces_after_grace() {
        smol::block_on(async {
            let (registry, ticker) = setup();
            let scheduler = Scheduler::new(1, registry).unwrap();

            let _handle = scheduler.schedule("ticker", tick_task());
            Timer::after(Duration::from_millis(30)).await;

            assert!(!scheduler.shutdown(Duration::from_millis(50)).await);

            let after_shutdown = ticker.ticks.load(Ordering::SeqCst);
            Timer::after(Duration::from_millis(100)).await;
            assert_eq!(ticker.ticks.load(Ordering::SeqCst), after_shutdown);
        });
    }

    #[test]
    fn test_schedule_after_shutdown_is_cancelled() {
        smol::block_on(async {
            let (registry, _ticker) = setup();
            let scheduler = Scheduler::new(1, registry).unwrap();
            assert!(scheduler.shutdown(Duration::from_millis(50)).await);

            let handle = scheduler.schedule("ticker", tick_task());
            assert!(handle.is_cancelled());
            assert_eq!(scheduler.active_tasks(), 0);
        });
    }
}
