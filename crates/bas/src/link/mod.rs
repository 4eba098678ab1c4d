//! Serial relay link
//!
//! A single physical transport to the relay board. [`SerialLink`] owns the
//! connection state machine (rate-limited reconnects, demotion on write
//! failure) and serializes every write across the process.

#[cfg(test)]
pub(crate) mod mock;
mod serial;
mod transport;

pub use serial::{DEFAULT_CONNECT_COOLDOWN, DEFAULT_WRITE_PACING, LinkSettings, LinkStatus, SerialLink};
pub use transport::{Connector, SerialConnector, Transport};

use thiserror::Error;

/// Errors raised by the relay link
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("Write failed: {0}")]
    Write(#[from] std::io::Error),
}

pub type LinkResult<T> = Result<T, LinkError>;
