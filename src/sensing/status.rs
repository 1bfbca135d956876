use std::fmt;

use log::{info, warn};
use serde::Serialize;
use tokio::sync::watch;

use crate::link::ConnectionReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum AcquisitionStatus {
    Idle,
    Connecting,
    Polling,
    Disconnected { reason: ConnectionReason },
    Reconnecting,
    Stopped,
}

impl Default for AcquisitionStatus {
    fn default() -> Self {
        AcquisitionStatus::Idle
    }
}

impl fmt::Display for AcquisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionStatus::Idle => f.write_str("idle"),
            AcquisitionStatus::Connecting => f.write_str("connecting"),
            AcquisitionStatus::Polling => f.write_str("polling"),
            AcquisitionStatus::Disconnected { reason } => write!(f, "disconnected ({reason})"),
            AcquisitionStatus::Reconnecting => f.write_str("reconnecting"),
            AcquisitionStatus::Stopped => f.write_str("stopped"),
        }
    }
}

/// Write side of the status channel.
///
/// Only real transitions are published and logged, so a sensor that stays
/// unplugged is reported once rather than once per retry.
#[derive(Debug)]
pub struct StatusBoard {
    tx: watch::Sender<AcquisitionStatus>,
}

impl StatusBoard {
    pub fn new() -> (Self, watch::Receiver<AcquisitionStatus>) {
        let (tx, rx) = watch::channel(AcquisitionStatus::Idle);
        (Self { tx }, rx)
    }

    pub fn current(&self) -> AcquisitionStatus {
        *self.tx.borrow()
    }

    /// Returns `true` when the status actually changed.
    pub fn set(&self, next: AcquisitionStatus) -> bool {
        let mut previous = next;
        let changed = self.tx.send_if_modified(|status| {
            if *status == next {
                return false;
            }
            previous = *status;
            *status = next;
            true
        });

        if changed {
            match next {
                AcquisitionStatus::Disconnected { .. } => {
                    warn!("Sensor status: {previous} -> {next}")
                }
                _ => info!("Sensor status: {previous} -> {next}"),
            }
        }
        changed
    }
}
