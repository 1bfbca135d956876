use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, SubsecRound, Utc};
use tokio::time::{self, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    db::{Database, InsertOutcome, StoreError},
    link::{ConnectionReason, Connector, FrameLink, LinkError},
    models::{reading::TIMESTAMP_PRECISION_DIGITS, Reading},
    protocol::decode,
};

use super::{
    backoff::{with_jitter, Backoff},
    publisher::ReadingPublisher,
    status::{AcquisitionStatus, StatusBoard},
    AcquisitionConfig,
};

// Set to false to silence this module without changing RUST_LOG
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

enum LoopState {
    Connecting,
    Polling(Box<dyn FrameLink>),
    Reconnecting(Box<dyn FrameLink>),
    Stopped,
}

/// Hands out strictly increasing reading timestamps even if the wall clock
/// steps backwards between two frames.
#[derive(Debug, Default)]
pub(crate) struct ReadingClock {
    last: Option<DateTime<Utc>>,
}

impl ReadingClock {
    pub(crate) fn stamp(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now = now.trunc_subsecs(TIMESTAMP_PRECISION_DIGITS);
        let stamped = match self.last {
            Some(last) if now <= last => last + ChronoDuration::microseconds(1),
            _ => now,
        };
        self.last = Some(stamped);
        stamped
    }
}

pub(crate) struct AcquisitionLoop {
    connector: Arc<dyn Connector>,
    db: Database,
    publisher: ReadingPublisher,
    status: Arc<StatusBoard>,
    config: AcquisitionConfig,
    cancel_token: CancellationToken,
    backoff: Backoff,
    clock: ReadingClock,
    consecutive_timeouts: u32,
}

impl AcquisitionLoop {
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        db: Database,
        publisher: ReadingPublisher,
        status: Arc<StatusBoard>,
        config: AcquisitionConfig,
        cancel_token: CancellationToken,
    ) -> Self {
        let backoff = Backoff::new(config.backoff_initial, config.backoff_max);
        Self {
            connector,
            db,
            publisher,
            status,
            config,
            cancel_token,
            backoff,
            clock: ReadingClock::default(),
            consecutive_timeouts: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        log_info!(
            "acquisition loop starting for {} (poll every {:?})",
            self.connector.describe(),
            self.config.poll_interval
        );

        let mut ticker = time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut state = LoopState::Connecting;
        loop {
            state = match state {
                LoopState::Connecting => self.connect(&mut ticker).await,
                LoopState::Polling(link) => self.poll(link, &mut ticker).await,
                LoopState::Reconnecting(link) => {
                    self.status.set(AcquisitionStatus::Reconnecting);
                    release(link).await;
                    LoopState::Connecting
                }
                LoopState::Stopped => break,
            };
        }

        self.status.set(AcquisitionStatus::Stopped);
        log_info!("acquisition loop stopped");
    }

    async fn connect(&mut self, ticker: &mut Interval) -> LoopState {
        if self.cancel_token.is_cancelled() {
            return LoopState::Stopped;
        }

        // Retries while disconnected keep the Disconnected status.
        if !matches!(self.status.current(), AcquisitionStatus::Disconnected { .. }) {
            self.status.set(AcquisitionStatus::Connecting);
        }

        let connector = Arc::clone(&self.connector);
        let mut attempt = tokio::task::spawn_blocking(move || connector.open());

        let opened = tokio::select! {
            joined = &mut attempt => joined,
            _ = self.cancel_token.cancelled() => {
                // An open that completes after the stop request still owns a device.
                if let Ok(Ok(link)) = attempt.await {
                    release(link).await;
                }
                return LoopState::Stopped;
            }
        };

        match opened {
            Ok(Ok(link)) => {
                log_info!("sensor connected via {}", self.connector.describe());
                self.backoff.reset();
                self.consecutive_timeouts = 0;
                ticker.reset();
                self.status.set(AcquisitionStatus::Polling);
                LoopState::Polling(link)
            }
            Ok(Err(err)) => self.wait_before_retry(err.reason, &err.to_string()).await,
            Err(join_err) => {
                log_error!("sensor open task failed: {join_err}");
                self.wait_before_retry(ConnectionReason::Busy, &join_err.to_string())
                    .await
            }
        }
    }

    async fn wait_before_retry(&mut self, reason: ConnectionReason, detail: &str) -> LoopState {
        if self.status.set(AcquisitionStatus::Disconnected { reason }) {
            log_warn!("{detail}");
        } else {
            log_debug!("still disconnected: {detail}");
        }

        let delay = with_jitter(self.backoff.next_delay());
        log_debug!("next connect attempt in {delay:?}");

        tokio::select! {
            _ = time::sleep(delay) => LoopState::Connecting,
            _ = self.cancel_token.cancelled() => LoopState::Stopped,
        }
    }

    async fn poll(&mut self, link: Box<dyn FrameLink>, ticker: &mut Interval) -> LoopState {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = self.cancel_token.cancelled() => {
                release(link).await;
                return LoopState::Stopped;
            }
        }

        let timeout = self.config.read_timeout;
        let mut read = tokio::task::spawn_blocking(move || {
            let mut link = link;
            let result = link.read_frame(timeout);
            (link, result)
        });

        let joined = tokio::select! {
            joined = &mut read => joined,
            _ = self.cancel_token.cancelled() => {
                // Drain: the in-flight read is bounded by `timeout`, and the
                // link must be closed before the loop reports Stopped.
                log_debug!("stop requested during a read; waiting up to {timeout:?}");
                match read.await {
                    Ok((link, _)) => release(link).await,
                    Err(join_err) => log_error!("frame read task failed: {join_err}"),
                }
                return LoopState::Stopped;
            }
        };

        let (link, result) = match joined {
            Ok(pair) => pair,
            Err(join_err) => {
                log_error!("frame read task failed: {join_err}");
                return LoopState::Connecting;
            }
        };

        match result {
            Ok(frame) => {
                self.consecutive_timeouts = 0;
                let timestamp = self.clock.stamp(Utc::now());
                match decode(&frame, timestamp) {
                    Ok(reading) => {
                        if !self.record(reading).await {
                            release(link).await;
                            return LoopState::Stopped;
                        }
                    }
                    Err(err) => log_warn!("discarding sensor frame: {err}"),
                }
                LoopState::Polling(link)
            }
            Err(LinkError::Timeout(after)) => {
                self.consecutive_timeouts += 1;
                if self.consecutive_timeouts == 1 {
                    log_warn!("no frame from sensor within {after:?}");
                } else {
                    log_debug!(
                        "no frame from sensor within {after:?} ({} in a row)",
                        self.consecutive_timeouts
                    );
                }
                LoopState::Polling(link)
            }
            Err(LinkError::Io(err)) => {
                log_warn!("sensor link lost: {err}");
                LoopState::Reconnecting(link)
            }
        }
    }

    /// Persists then publishes. Returns `false` when acquisition must stop.
    async fn record(&mut self, reading: Reading) -> bool {
        match self.db.insert(&reading).await {
            Ok(InsertOutcome::Inserted) => {
                let delivered = self.publisher.publish(reading);
                log_debug!(
                    "reading pm2.5={} pm10={} at {} -> {} subscriber(s)",
                    reading.pm25(),
                    reading.pm10(),
                    reading.timestamp(),
                    delivered
                );
                true
            }
            Ok(InsertOutcome::IgnoredDuplicate) => {
                log_debug!("reading at {} already stored", reading.timestamp());
                true
            }
            Err(StoreError::Closed) => {
                log_error!("reading store closed; stopping acquisition");
                false
            }
            Err(err) => {
                // Subscribers still get live values while the store misbehaves.
                log_error!("failed to persist reading: {err:#}");
                self.publisher.publish(reading);
                true
            }
        }
    }
}

async fn release(link: Box<dyn FrameLink>) {
    if let Err(err) = tokio::task::spawn_blocking(move || link.close()).await {
        log_error!("failed to release sensor link: {err}");
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn clock_is_strictly_increasing() {
        let mut clock = ReadingClock::default();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let a = clock.stamp(t0);
        let b = clock.stamp(t0);
        let c = clock.stamp(t0 - ChronoDuration::seconds(5));
        let d = clock.stamp(t0 + ChronoDuration::seconds(1));

        assert_eq!(a, t0);
        assert_eq!(b, t0 + ChronoDuration::microseconds(1));
        assert_eq!(c, t0 + ChronoDuration::microseconds(2));
        assert_eq!(d, t0 + ChronoDuration::seconds(1));
    }
}
