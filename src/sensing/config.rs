use std::time::Duration;

use super::publisher::DEFAULT_SUBSCRIBER_CAPACITY;

/// Timing knobs for the acquisition loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionConfig {
    /// Minimum gap between frame reads. The SDS011 produces one measurement
    /// per second, so polling faster only returns stale or partial frames.
    pub poll_interval: Duration,

    /// How long one read may wait for a complete frame.
    pub read_timeout: Duration,

    /// First delay after a failed connect; doubled per failure up to `backoff_max`.
    pub backoff_initial: Duration,
    pub backoff_max: Duration,

    /// Pending readings buffered per subscriber before the oldest are dropped.
    pub subscriber_capacity: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            read_timeout: Duration::from_secs(2),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}
