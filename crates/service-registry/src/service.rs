//! The capability every registrable service implements, and the periodic
//! callbacks a service declares.

use crate::descriptor::ServiceDescriptor;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::any::{Any, type_name};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Conversion of a shared service into `Any`, used for typed lookups.
///
/// Implemented for every `Send + Sync + 'static` type.
pub trait AsAnyArc {
    /// Upcast to a shared `Any`
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAnyArc for T {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A managed service with a start/stop lifecycle
#[async_trait]
pub trait Service: AsAnyArc + Send + Sync + 'static {
    /// Bring the service up. A failure keeps the service out of the
    /// active set.
    async fn start(&self) -> anyhow::Result<()>;

    /// Tear the service down. Failures during shutdown are logged only.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Periodic callbacks to schedule once the service is active
    fn scheduled_tasks(&self) -> Vec<ScheduledTask> {
        Vec::new()
    }
}

/// Shared handle to an active service
pub type ServiceHandle = Arc<dyn Service>;

/// A service type that carries its own descriptor and constructor
pub trait DescribedService: Service + Sized {
    /// Static metadata for this service type
    fn descriptor() -> ServiceDescriptor;

    /// Construct a fresh, not yet started, instance
    fn create() -> anyhow::Result<Self>;
}

/// Unit for a periodic interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Milliseconds
    Milliseconds,
    /// Seconds
    Seconds,
    /// Minutes
    Minutes,
    /// Hours
    Hours,
    /// Days
    Days,
}

impl TimeUnit {
    fn as_millis(self) -> u64 {
        match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
            TimeUnit::Days => 86_400_000,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self {
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        };
        f.write_str(unit)
    }
}

/// Fixed interval between two invocations of a periodic callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    /// Number of units
    pub value: u64,
    /// Unit of `value`
    pub unit: TimeUnit,
}

impl Period {
    /// Create a period
    pub const fn new(value: u64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    /// Period in milliseconds
    pub const fn millis(value: u64) -> Self {
        Self::new(value, TimeUnit::Milliseconds)
    }

    /// Period in seconds
    pub const fn seconds(value: u64) -> Self {
        Self::new(value, TimeUnit::Seconds)
    }

    /// Period in minutes
    pub const fn minutes(value: u64) -> Self {
        Self::new(value, TimeUnit::Minutes)
    }

    /// A zero period cannot be scheduled
    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// Convert to a `Duration`, saturating on overflow
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.value.saturating_mul(self.unit.as_millis()))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

type TaskCallback = dyn Fn(ServiceHandle) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// A periodic callback declared by a service.
///
/// The callback receives the owning service, looked up by name at every
/// invocation.
#[derive(Clone)]
pub struct ScheduledTask {
    name: String,
    period: Period,
    callback: Arc<TaskCallback>,
}

impl ScheduledTask {
    /// Declare a callback on service type `S`
    pub fn new<S, F, Fut>(name: impl Into<String>, period: Period, callback: F) -> Self
    where
        S: Service,
        F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let callback = move |service: ServiceHandle| match service.into_any().downcast::<S>() {
            Ok(service) => callback(service).boxed(),
            Err(_) => futures::future::ready(Err(anyhow::anyhow!(
                "service is not of type {}",
                type_name::<S>()
            )))
            .boxed(),
        };

        Self {
            name: name.into(),
            period,
            callback: Arc::new(callback),
        }
    }

    /// Callback name, used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interval between invocations
    pub fn period(&self) -> Period {
        self.period
    }

    /// Run the callback once against `service`
    pub fn invoke(&self, service: ServiceHandle) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.callback)(service)
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("period", &self.period)
            .finish()
    }
}
