//! Periodic services
//!
//! A service is a stateful component that the [`ServiceManager`] drives on
//! its own task at a fixed period:
//!
//! - `on_start` once, before the first tick; an error here fails the service
//! - `on_tick` every period (and on demand); errors are logged, never fatal
//! - `on_stop` once on shutdown, bounded by `ServiceSpec::stop_timeout`

mod event;
mod handle;
mod manager;

pub use event::*;
pub use handle::*;
pub use manager::*;

use std::time::Duration;

use async_trait::async_trait;

/// Default upper bound for `on_stop`
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Service {id} failed to start: {reason}")]
    Start { id: String, reason: String },

    #[error("Service {0} is already running")]
    Duplicate(String),

    #[error("No service named {0}")]
    Unknown(String),

    #[error("Tick failed: {0}")]
    Tick(String),

    #[error("Service {0} did not stop in time")]
    StopTimeout(String),

    #[error("Service {0} exited unexpectedly")]
    Crashed(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Identity and cadence of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub id: String,
    pub name: String,
    /// Time between ticks; a slow tick delays the next one rather than
    /// bunching several together
    pub period: Duration,
    pub stop_timeout: Duration,
}

impl ServiceSpec {
    pub fn periodic(id: impl Into<String>, name: impl Into<String>, period: Duration) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            period,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

/// Passed to every hook; lets a service publish on the bus
pub struct ServiceContext {
    id: String,
    bus: EventBus,
}

impl ServiceContext {
    pub fn new(id: impl Into<String>, bus: EventBus) -> Self {
        Self { id: id.into(), bus }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Publish `payload` under `topic` with this service as origin
    pub fn emit(&self, topic: impl Into<String>, payload: serde_json::Value) -> usize {
        self.bus.publish(Event::new(topic, self.id.as_str(), payload))
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

#[async_trait]
pub trait Service: Send + 'static {
    fn spec(&self) -> ServiceSpec;

    async fn on_start(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        Ok(())
    }

    async fn on_tick(&mut self, ctx: &ServiceContext) -> ServiceResult<()>;

    async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periodic_spec() {
        let spec = ServiceSpec::periodic("bas/control-loop", "Control Loop", Duration::from_secs(1))
            .with_stop_timeout(Duration::from_secs(2));

        assert_eq!(spec.period, Duration::from_secs(1));
        assert_eq!(spec.stop_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_context_emits_with_origin() {
        let bus = EventBus::default();
        let mut all = bus.watch("*");
        let ctx = ServiceContext::new("bas/control-loop", bus);

        assert_eq!(ctx.emit("link/lost", serde_json::json!({"port": "COM3"})), 1);

        let event = all.next().await.unwrap();
        assert_eq!(event.origin, "bas/control-loop");
        assert_eq!(event.str_field("port"), Some("COM3"));
    }
}
