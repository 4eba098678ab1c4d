//! Service Manager
//!
//! Runs each service on its own task and stops them on request.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{
    EventBus, Lifecycle, Request, Service, ServiceContext, ServiceError, ServiceHandle,
    ServiceResult, ServiceSpec,
};

/// Extra time allowed for a task to exit after its `on_stop` deadline
const JOIN_GRACE: Duration = Duration::from_secs(1);

struct Running {
    handle: ServiceHandle,
    task: JoinHandle<ServiceResult<()>>,
    stop_timeout: Duration,
}

pub struct ServiceManager {
    services: DashMap<String, Running>,
    bus: EventBus,
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceManager {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
            bus: EventBus::default(),
        }
    }

    /// Bus shared by every service this manager runs
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Start `service` on a new task. Must be called inside a Tokio runtime.
    pub fn spawn<S: Service>(&self, service: S) -> ServiceResult<ServiceHandle> {
        let spec = service.spec();

        let slot = match self.services.entry(spec.id.clone()) {
            Entry::Occupied(_) => return Err(ServiceError::Duplicate(spec.id)),
            Entry::Vacant(slot) => slot,
        };

        let (request_tx, request_rx) = mpsc::channel(16);
        let (lifecycle_tx, lifecycle_rx) = watch::channel(Lifecycle::Starting);
        let handle = ServiceHandle::new(spec.id.clone(), request_tx, lifecycle_rx);

        let ctx = ServiceContext::new(spec.id.clone(), self.bus.clone());
        let stop_timeout = spec.stop_timeout;
        let task = tokio::spawn(drive(service, spec, ctx, request_rx, lifecycle_tx));

        slot.insert(Running {
            handle: handle.clone(),
            task,
            stop_timeout,
        });
        Ok(handle)
    }

    pub fn handle(&self, id: &str) -> Option<ServiceHandle> {
        self.services.get(id).map(|running| running.handle.clone())
    }

    /// Stop one service and wait for its task
    pub async fn stop(&self, id: &str) -> ServiceResult<()> {
        let (id, running) = self
            .services
            .remove(id)
            .ok_or_else(|| ServiceError::Unknown(id.to_string()))?;
        finish(&id, running).await
    }

    /// Stop every service. All are stopped even if some fail; the last
    /// failure is returned.
    pub async fn shutdown_all(&self) -> ServiceResult<()> {
        let ids: Vec<String> = self.services.iter().map(|s| s.key().clone()).collect();
        tracing::info!(count = ids.len(), "Stopping services");

        let mut outcome = Ok(());
        for id in ids {
            if let Some((id, running)) = self.services.remove(&id) {
                if let Err(e) = finish(&id, running).await {
                    outcome = Err(e);
                }
            }
        }
        outcome
    }

    pub fn services(&self) -> Vec<(String, Lifecycle)> {
        self.services
            .iter()
            .map(|s| (s.key().clone(), s.handle.lifecycle()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

async fn finish(id: &str, running: Running) -> ServiceResult<()> {
    // A task that already exited has dropped its receiver
    let _ = running.handle.stop().await;

    match tokio::time::timeout(running.stop_timeout + JOIN_GRACE, running.task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            tracing::error!(service = id, error = %join_error, "Service task panicked");
            Err(ServiceError::Crashed(id.to_string()))
        }
        Err(_) => {
            tracing::warn!(service = id, "Service task did not exit");
            Err(ServiceError::StopTimeout(id.to_string()))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service task
// ─────────────────────────────────────────────────────────────────────────────

async fn drive<S: Service>(
    mut service: S,
    spec: ServiceSpec,
    ctx: ServiceContext,
    mut requests: mpsc::Receiver<Request>,
    lifecycle: watch::Sender<Lifecycle>,
) -> ServiceResult<()> {
    if let Err(e) = service.on_start(&ctx).await {
        tracing::error!(service = %spec.id, error = %e, "Service failed to start");
        lifecycle.send_replace(Lifecycle::Failed);
        return Err(e);
    }

    lifecycle.send_replace(Lifecycle::Running);
    tracing::info!(
        service = %spec.id,
        name = %spec.name,
        period_ms = spec.period.as_millis() as u64,
        "Service running"
    );

    // `interval` rejects a zero period
    let mut ticker = tokio::time::interval(spec.period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let result = tokio::select! {
            // Requests first so a stop is never starved by overdue ticks
            biased;

            request = requests.recv() => match request {
                Some(Request::TickNow(reply)) => {
                    let result = service.on_tick(&ctx).await;
                    if let Err(e) = &result {
                        tracing::warn!(service = %spec.id, error = %e, "Requested tick failed");
                    }
                    let _ = reply.send(result);
                    continue;
                }
                Some(Request::Stop) | None => break,
            },

            _ = ticker.tick() => service.on_tick(&ctx).await,
        };

        if let Err(e) = result {
            tracing::warn!(service = %spec.id, error = %e, "Tick failed");
        }
    }

    lifecycle.send_replace(Lifecycle::Stopping);

    let (state, result) =
        match tokio::time::timeout(spec.stop_timeout, service.on_stop(&ctx)).await {
            Ok(Ok(())) => (Lifecycle::Stopped, Ok(())),
            Ok(Err(e)) => {
                tracing::error!(service = %spec.id, error = %e, "Service stop failed");
                (Lifecycle::Failed, Err(e))
            }
            Err(_) => {
                tracing::error!(service = %spec.id, "Service stop timed out");
                (Lifecycle::Failed, Err(ServiceError::StopTimeout(spec.id.clone())))
            }
        };

    lifecycle.send_replace(state);
    tracing::info!(service = %spec.id, state = %state, "Service exited");
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Default)]
    struct Counters {
        ticks: AtomicUsize,
        stops: AtomicUsize,
        fail_ticks: AtomicBool,
    }

    /// Counts hook calls and emits `counter/tick` after each good tick
    struct CountingService {
        id: &'static str,
        period: Duration,
        fail_start: bool,
        counters: Arc<Counters>,
    }

    fn counting_service(id: &'static str) -> (CountingService, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let service = CountingService {
            id,
            period: Duration::from_secs(3600),
            fail_start: false,
            counters: Arc::clone(&counters),
        };
        (service, counters)
    }

    #[async_trait]
    impl Service for CountingService {
        fn spec(&self) -> ServiceSpec {
            ServiceSpec::periodic(self.id, "Counter", self.period)
        }

        async fn on_start(&mut self, ctx: &ServiceContext) -> ServiceResult<()> {
            if self.fail_start {
                return Err(ServiceError::Start {
                    id: ctx.id().to_string(),
                    reason: "port busy".to_string(),
                });
            }
            Ok(())
        }

        async fn on_tick(&mut self, ctx: &ServiceContext) -> ServiceResult<()> {
            let n = self.counters.ticks.fetch_add(1, Ordering::SeqCst);
            if self.counters.fail_ticks.load(Ordering::SeqCst) {
                return Err(ServiceError::Tick(format!("tick {}", n)));
            }
            ctx.emit("counter/tick", serde_json::json!({ "n": n }));
            Ok(())
        }

        async fn on_stop(&mut self, _ctx: &ServiceContext) -> ServiceResult<()> {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_tick_keeps_service_running() {
        let manager = ServiceManager::new();
        let (service, counters) = counting_service("counter");
        let handle = assert_ok!(manager.spawn(service));

        counters.fail_ticks.store(true, Ordering::SeqCst);
        let err = assert_err!(handle.tick_now().await);
        assert!(matches!(err, ServiceError::Tick(_)));

        counters.fail_ticks.store(false, Ordering::SeqCst);
        assert_ok!(handle.tick_now().await);
        assert!(handle.is_running());
        assert_eq!(
            manager.services(),
            vec![("counter".to_string(), Lifecycle::Running)]
        );

        assert_ok!(manager.stop("counter").await);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
        assert_eq!(handle.exited().await, Lifecycle::Stopped);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let manager = ServiceManager::new();
        let (first, _) = counting_service("counter");
        let (second, _) = counting_service("counter");

        assert_ok!(manager.spawn(first));
        let err = assert_err!(manager.spawn(second));
        assert_eq!(err, ServiceError::Duplicate("counter".to_string()));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.handle("counter").map(|h| h.id().to_string()), Some("counter".to_string()));
        assert!(manager.handle("other").is_none());

        assert_ok!(manager.shutdown_all().await);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_stop_unknown_service() {
        let manager = ServiceManager::new();
        let err = assert_err!(manager.stop("nope").await);
        assert_eq!(err, ServiceError::Unknown("nope".to_string()));
    }

    #[tokio::test]
    async fn test_failed_start_is_terminal() {
        let manager = ServiceManager::new();
        let (mut service, counters) = counting_service("counter");
        service.fail_start = true;

        let handle = assert_ok!(manager.spawn(service));
        assert_eq!(handle.exited().await, Lifecycle::Failed);
        assert_eq!(counters.ticks.load(Ordering::SeqCst), 0);

        let err = assert_err!(manager.stop("counter").await);
        assert!(matches!(err, ServiceError::Start { .. }));
        assert_eq!(counters.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ticks_publish_on_shared_bus() {
        let manager = ServiceManager::new();
        let mut ticks = manager.bus().watch("counter/*");
        let (service, _) = counting_service("counter");
        let handle = assert_ok!(manager.spawn(service));

        // The interval's first tick completes immediately
        let event = ticks.next().await.unwrap();
        assert_eq!(event.origin, "counter");
        assert_eq!(event.num_field("n"), Some(0.0));

        assert_ok!(manager.shutdown_all().await);
        assert!(!handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_period_drives_ticks() {
        let manager = ServiceManager::new();
        let (mut service, counters) = counting_service("counter");
        service.period = Duration::from_secs(1);
        assert_ok!(manager.spawn(service));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(counters.ticks.load(Ordering::SeqCst), 4);

        assert_ok!(manager.shutdown_all().await);
    }
}
