//! In-memory connector for tests

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::transport::{Connector, Transport};
use super::{LinkError, LinkResult};

#[derive(Default)]
struct Shared {
    connects: AtomicUsize,
    closes: AtomicUsize,
    fail_open: AtomicBool,
    fail_writes: AtomicBool,
    sent: Mutex<Vec<(Instant, Vec<u8>)>>,
}

/// Records connect calls and every frame written through its transports
#[derive(Clone, Default)]
pub struct MockConnector {
    shared: Arc<Shared>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(&self, fail: bool) {
        self.shared.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.shared.sent.lock().iter().map(|(_, f)| f.clone()).collect()
    }

    pub fn send_times(&self) -> Vec<Instant> {
        self.shared.sent.lock().iter().map(|(t, _)| *t).collect()
    }

    pub fn clear_frames(&self) {
        self.shared.sent.lock().clear();
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, port: &str, _baud_rate: u32) -> LinkResult<Box<dyn Transport>> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_open.load(Ordering::SeqCst) {
            return Err(LinkError::Open {
                port: port.to_string(),
                reason: "no such device".to_string(),
            });
        }
        Ok(Box::new(MockTransport {
            shared: self.shared.clone(),
        }))
    }
}

struct MockTransport {
    shared: Arc<Shared>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "board unplugged"));
        }
        self.shared.sent.lock().push((Instant::now(), frame.to_vec()));
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
