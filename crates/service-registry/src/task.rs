//! Cancellation handles for scheduled callbacks

use crate::service::Period;
use async_channel::{Receiver, Sender};

/// Handle to a scheduled callback owned by an active service.
///
/// Cancelling (or dropping) the handle stops future invocations. An
/// invocation already in progress is not interrupted.
#[derive(Debug)]
pub struct TaskHandle {
    service: String,
    task: String,
    period: Period,
    cancel: Sender<()>,
}

/// Receiving side of a [`TaskHandle`], held by the task loop
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Receiver<()>,
}

impl TaskHandle {
    /// Create a handle and the token the task loop watches
    pub fn new(
        service: impl Into<String>,
        task: impl Into<String>,
        period: Period,
    ) -> (Self, CancellationToken) {
        // Nothing is ever sent: closing the channel is the signal.
        let (cancel, cancelled) = async_channel::bounded(1);
        let handle = Self {
            service: service.into(),
            task: task.into(),
            period,
            cancel,
        };
        (handle, CancellationToken { cancelled })
    }

    /// Owning service name
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Callback name
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Invocation interval
    pub fn period(&self) -> Period {
        self.period
    }

    /// Request cancellation. Returns `false` if it was already cancelled.
    pub fn cancel(&self) -> bool {
        self.cancel.close()
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_closed()
    }
}

impl CancellationToken {
    /// Resolves once the owning handle is cancelled or dropped
    pub async fn cancelled(&self) {
        let _ = self.cancelled.recv().await;
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_closed()
    }
}
