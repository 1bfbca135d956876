//! Byte-stream link to the particulate sensor.
//!
//! The acquisition loop only sees the [`Connector`] and [`FrameLink`]
//! traits; [`SerialConnector`] is the production implementation.

mod discovery;
mod framer;
mod serial;

use std::{fmt, io, time::Duration};

use serde::Serialize;
use thiserror::Error;

use crate::protocol::Frame;

pub use discovery::{list_ports, DeviceSelector, PortInfo};
pub use framer::FrameAssembler;
pub use serial::{SerialConnector, SerialLink, DEFAULT_BAUD_RATE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionReason {
    NotFound,
    Busy,
    Permission,
}

impl ConnectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionReason::NotFound => "NotFound",
            ConnectionReason::Busy => "Busy",
            ConnectionReason::Permission => "Permission",
        }
    }
}

impl fmt::Display for ConnectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("sensor unavailable ({reason}): {detail}")]
pub struct ConnectionError {
    pub reason: ConnectionReason,
    pub detail: String,
}

impl ConnectionError {
    pub fn new(reason: ConnectionReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ConnectionReason::NotFound, detail)
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    /// No complete frame arrived before the deadline. The link is still usable.
    #[error("no frame within {0:?}")]
    Timeout(Duration),

    /// The device stopped responding at the OS level, typically unplugged.
    #[error("link I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Opens links to one configured device.
pub trait Connector: Send + Sync + 'static {
    fn open(&self) -> Result<Box<dyn FrameLink>, ConnectionError>;

    /// Human-readable device label for log lines.
    fn describe(&self) -> String;
}

/// An open link that yields candidate frames.
pub trait FrameLink: Send + 'static {
    /// Blocks until ten aligned bytes are available or `timeout` elapses.
    fn read_frame(&mut self, timeout: Duration) -> Result<Frame, LinkError>;

    fn close(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_mentions_reason() {
        let err = ConnectionError::not_found("no port matching \"USB-SERIAL\"");
        assert_eq!(err.reason, ConnectionReason::NotFound);
        assert!(err.to_string().contains("NotFound"));
    }

    #[test]
    fn io_errors_convert_into_link_errors() {
        let err: LinkError = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, LinkError::Io(_)));
    }
}
