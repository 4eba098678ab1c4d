//! Connection state machine for the relay board

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::transport::{Connector, SerialConnector, Transport};
use super::{LinkError, LinkResult};
use crate::protocol;

/// Default minimum spacing between connect attempts
pub const DEFAULT_CONNECT_COOLDOWN: Duration = Duration::from_secs(5);
/// Default delay between consecutive frames of one sequence
pub const DEFAULT_WRITE_PACING: Duration = Duration::from_millis(50);

/// Where and how to reach the relay board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    pub port: String,
    pub baud_rate: u32,
    pub connect_cooldown: Duration,
    pub write_pacing: Duration,
}

impl LinkSettings {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            connect_cooldown: DEFAULT_CONNECT_COOLDOWN,
            write_pacing: DEFAULT_WRITE_PACING,
        }
    }

    pub fn with_connect_cooldown(mut self, cooldown: Duration) -> Self {
        self.connect_cooldown = cooldown;
        self
    }

    pub fn with_write_pacing(mut self, pacing: Duration) -> Self {
        self.write_pacing = pacing;
        self
    }
}

/// Result of [`SerialLink::ensure_connected`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Was already connected
    Ready,
    /// A new connection was opened by this call
    Connected,
    /// Disconnected, and the last attempt is too recent to retry
    CoolingDown,
    /// An attempt was made and failed
    Failed,
}

impl LinkStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkStatus::Ready | LinkStatus::Connected)
    }
}

enum LinkState {
    Disconnected { last_attempt: Option<Instant> },
    Connected { transport: Box<dyn Transport>, since: Instant },
}

/// The single shared link to the relay board.
///
/// All writes go through one lock, so at most one frame sequence is in
/// flight across the process.
pub struct SerialLink {
    settings: LinkSettings,
    connector: Arc<dyn Connector>,
    state: Mutex<LinkState>,
}

impl SerialLink {
    pub fn new(settings: LinkSettings, connector: Arc<dyn Connector>) -> Self {
        Self {
            settings,
            connector,
            state: Mutex::new(LinkState::Disconnected { last_attempt: None }),
        }
    }

    /// Link backed by a real serial port
    pub fn serial(settings: LinkSettings) -> Self {
        Self::new(settings, Arc::new(SerialConnector))
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.lock().await, LinkState::Connected { .. })
    }

    /// Connect if disconnected and the cooldown since the last attempt has passed
    pub async fn ensure_connected(&self) -> LinkStatus {
        let mut state = self.state.lock().await;

        let last_attempt = match &*state {
            LinkState::Connected { .. } => return LinkStatus::Ready,
            LinkState::Disconnected { last_attempt } => *last_attempt,
        };

        if let Some(at) = last_attempt {
            if at.elapsed() < self.settings.connect_cooldown {
                return LinkStatus::CoolingDown;
            }
        }

        let attempt = Instant::now();
        match self
            .connector
            .open(&self.settings.port, self.settings.baud_rate)
            .await
        {
            Ok(transport) => {
                info!(
                    port = %self.settings.port,
                    baud_rate = self.settings.baud_rate,
                    "Serial link connected"
                );
                *state = LinkState::Connected {
                    transport,
                    since: attempt,
                };
                LinkStatus::Connected
            }
            Err(e) => {
                if last_attempt.is_none() {
                    warn!(port = %self.settings.port, error = %e, "Serial link unavailable");
                } else {
                    debug!(port = %self.settings.port, error = %e, "Serial reconnect failed");
                }
                *state = LinkState::Disconnected {
                    last_attempt: Some(attempt),
                };
                LinkStatus::Failed
            }
        }
    }

    /// Write a single coil. Returns false if the link was down and the write dropped.
    pub async fn write_relay(&self, relay: u16, on: bool) -> LinkResult<bool> {
        Ok(self.write_sequence(&[(relay, on)]).await? > 0)
    }

    /// Write coils in order, pacing consecutive frames.
    ///
    /// Returns the number of frames sent; zero when disconnected (writes are
    /// dropped, not queued). A failed write demotes the link and stops the
    /// sequence.
    pub async fn write_sequence(&self, writes: &[(u16, bool)]) -> LinkResult<usize> {
        let mut state = self.state.lock().await;

        let result = match &mut *state {
            LinkState::Disconnected { .. } => {
                trace!(frames = writes.len(), "Link down, dropping writes");
                return Ok(0);
            }
            LinkState::Connected { transport, .. } => {
                send_paced(transport.as_mut(), writes, self.settings.write_pacing).await
            }
        };

        match result {
            Ok(sent) => Ok(sent),
            Err(e) => {
                self.demote(&mut *state, &e).await;
                Err(LinkError::Write(e))
            }
        }
    }

    /// Close the transport if open; safe to call repeatedly
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, LinkState::Disconnected { last_attempt: None });

        match previous {
            LinkState::Connected { mut transport, since } => {
                *state = LinkState::Disconnected {
                    last_attempt: Some(since),
                };
                if let Err(e) = transport.close().await {
                    debug!(error = %e, "Error closing serial link");
                }
                info!(port = %self.settings.port, "Serial link closed");
            }
            disconnected => *state = disconnected,
        }
    }

    async fn demote(&self, state: &mut LinkState, cause: &std::io::Error) {
        let previous = std::mem::replace(state, LinkState::Disconnected { last_attempt: None });

        if let LinkState::Connected { mut transport, since } = previous {
            // Cooldown counts from the attempt that opened this connection
            *state = LinkState::Disconnected {
                last_attempt: Some(since),
            };
            let _ = transport.close().await;
            error!(port = %self.settings.port, error = %cause, "Serial link lost");
        }
    }
}

async fn send_paced(
    transport: &mut dyn Transport,
    writes: &[(u16, bool)],
    pacing: Duration,
) -> std::io::Result<usize> {
    for (i, &(relay, on)) in writes.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(pacing).await;
        }
        let frame = protocol::encode_write_coil(relay, on);
        transport.send(&frame).await?;
        trace!(relay, on, "Coil written");
    }
    Ok(writes.len())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
