//! Byte transports behind the relay link

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use super::{LinkError, LinkResult};

/// An open, writable connection to the relay board
#[async_trait]
pub trait Transport: Send {
    /// Write one complete frame
    async fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Release the underlying handle
    async fn close(&mut self) -> io::Result<()>;
}

/// Opens transports; one call per connect attempt
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, port: &str, baud_rate: u32) -> LinkResult<Box<dyn Transport>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Serial port
// ─────────────────────────────────────────────────────────────────────────────

const SERIAL_TIMEOUT: Duration = Duration::from_millis(100);

/// Connector for a real serial port
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

#[async_trait]
impl Connector for SerialConnector {
    async fn open(&self, port: &str, baud_rate: u32) -> LinkResult<Box<dyn Transport>> {
        let open_error = |reason: String| LinkError::Open {
            port: port.to_string(),
            reason,
        };

        // Opening and configuring the device blocks; keep it off the runtime workers
        let builder = tokio_serial::new(port, baud_rate).timeout(SERIAL_TIMEOUT);
        let stream = tokio::task::spawn_blocking(move || builder.open_native_async())
            .await
            .map_err(|e| open_error(e.to_string()))?
            .map_err(|e| open_error(e.to_string()))?;

        Ok(Box::new(SerialTransport { stream }))
    }
}

struct SerialTransport {
    stream: SerialStream,
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.stream.write_all(frame).await?;
        self.stream.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}
