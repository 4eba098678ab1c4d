//! Handle to a running service

use std::fmt;

use tokio::sync::{mpsc, oneshot, watch};

use super::{ServiceError, ServiceResult};

/// Where a service is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl Lifecycle {
    /// The task has exited and will not run again
    pub fn has_exited(&self) -> bool {
        matches!(self, Lifecycle::Stopped | Lifecycle::Failed)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Lifecycle::Starting => "starting",
            Lifecycle::Running => "running",
            Lifecycle::Stopping => "stopping",
            Lifecycle::Stopped => "stopped",
            Lifecycle::Failed => "failed",
        };
        f.write_str(label)
    }
}

pub(crate) enum Request {
    /// Tick immediately and report the result
    TickNow(oneshot::Sender<ServiceResult<()>>),
    Stop,
}

#[derive(Clone)]
pub struct ServiceHandle {
    id: String,
    requests: mpsc::Sender<Request>,
    lifecycle: watch::Receiver<Lifecycle>,
}

impl ServiceHandle {
    pub(crate) fn new(
        id: String,
        requests: mpsc::Sender<Request>,
        lifecycle: watch::Receiver<Lifecycle>,
    ) -> Self {
        Self {
            id,
            requests,
            lifecycle,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    /// Wait until the service task has exited and return its final state
    pub async fn exited(&self) -> Lifecycle {
        let mut lifecycle = self.lifecycle.clone();
        match lifecycle.wait_for(Lifecycle::has_exited).await {
            Ok(state) => *state,
            // Sender dropped without reaching a final state
            Err(_) => Lifecycle::Failed,
        }
    }

    /// Run one tick now, outside the regular period, and wait for it
    pub async fn tick_now(&self) -> ServiceResult<()> {
        let (reply, result) = oneshot::channel();
        self.send(Request::TickNow(reply)).await?;
        result
            .await
            .map_err(|_| ServiceError::Crashed(self.id.clone()))?
    }

    /// Ask the service to stop; does not wait for it
    pub async fn stop(&self) -> ServiceResult<()> {
        self.send(Request::Stop).await
    }

    async fn send(&self, request: Request) -> ServiceResult<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| ServiceError::Unknown(self.id.clone()))
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("id", &self.id)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}
