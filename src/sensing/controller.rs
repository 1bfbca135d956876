use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::link::Connector;

use super::loop_worker::AcquisitionLoop;
use super::{
    AcquisitionConfig, AcquisitionStatus, ReadingPublisher, ReadingSubscription, StatusBoard,
};

/// Owns the background acquisition task.
///
/// Subscriptions and the status receiver can be taken before `start` and
/// stay valid across restarts.
pub struct AcquisitionController {
    config: AcquisitionConfig,
    publisher: ReadingPublisher,
    status: Arc<StatusBoard>,
    status_rx: watch::Receiver<AcquisitionStatus>,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl AcquisitionController {
    pub fn new(config: AcquisitionConfig) -> Self {
        let (status, status_rx) = StatusBoard::new();
        Self {
            publisher: ReadingPublisher::new(config.subscriber_capacity),
            config,
            status: Arc::new(status),
            status_rx,
            handle: None,
            cancel_token: None,
        }
    }

    pub fn subscribe(&self) -> ReadingSubscription {
        self.publisher.subscribe()
    }

    pub fn status(&self) -> watch::Receiver<AcquisitionStatus> {
        self.status_rx.clone()
    }

    pub fn current_status(&self) -> AcquisitionStatus {
        *self.status_rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawns the acquisition loop. Connection failures never surface here;
    /// they show up as [`AcquisitionStatus::Disconnected`].
    pub fn start(&mut self, connector: Arc<dyn Connector>, db: Database) -> Result<()> {
        if self.is_running() {
            bail!("acquisition already active");
        }
        // The previous loop ended on its own (e.g. the store was closed).
        self.handle = None;
        self.cancel_token = None;
        if self.config.poll_interval.is_zero() {
            bail!("poll interval must be greater than zero");
        }

        info!("Starting acquisition from {}", connector.describe());

        let cancel_token = CancellationToken::new();
        let worker = AcquisitionLoop::new(
            connector,
            db,
            self.publisher.clone(),
            Arc::clone(&self.status),
            self.config.clone(),
            cancel_token.clone(),
        );

        self.handle = Some(tokio::spawn(worker.run()));
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Requests shutdown and waits for the loop to release the link.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("acquisition task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Drop for AcquisitionController {
    fn drop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
    }
}
