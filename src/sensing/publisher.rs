use log::warn;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use crate::models::Reading;

pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// Fan-out of accepted readings to any number of subscribers.
///
/// Publishing never waits. Each subscriber has a bounded backlog; once it
/// is full the oldest pending readings are overwritten and the subscriber
/// learns how many it missed on its next `recv`.
#[derive(Debug, Clone)]
pub struct ReadingPublisher {
    tx: broadcast::Sender<Reading>,
}

impl ReadingPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of subscribers the reading was queued for.
    pub fn publish(&self, reading: Reading) -> usize {
        self.tx.send(reading).unwrap_or(0)
    }

    pub fn subscribe(&self) -> ReadingSubscription {
        ReadingSubscription {
            rx: self.tx.subscribe(),
            dropped: 0,
        }
    }
}

impl Default for ReadingPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

pub struct ReadingSubscription {
    rx: broadcast::Receiver<Reading>,
    dropped: u64,
}

impl ReadingSubscription {
    /// Next reading in decode order, or `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<Reading> {
        loop {
            match self.rx.recv().await {
                Ok(reading) => return Some(reading),
                Err(RecvError::Lagged(skipped)) => self.note_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when nothing is pending.
    pub fn try_recv(&mut self) -> Option<Reading> {
        loop {
            match self.rx.try_recv() {
                Ok(reading) => return Some(reading),
                Err(TryRecvError::Lagged(skipped)) => self.note_lag(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Readings this subscriber lost because it fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn note_lag(&mut self, skipped: u64) {
        self.dropped += skipped;
        warn!("Reading subscriber fell behind; dropped {skipped} oldest reading(s)");
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    fn reading(n: i64) -> Reading {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(n);
        Reading::new(at, n as f64, n as f64).unwrap()
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let publisher = ReadingPublisher::new(4);
        assert_eq!(publisher.publish(reading(1)), 0);
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let publisher = ReadingPublisher::new(8);
        let mut sub = publisher.subscribe();
        for n in 0..5 {
            publisher.publish(reading(n));
        }
        for n in 0..5 {
            assert_eq!(sub.recv().await, Some(reading(n)));
        }
    }

    #[tokio::test]
    async fn slow_subscriber_loses_oldest_first() {
        let publisher = ReadingPublisher::new(2);
        let mut slow = publisher.subscribe();

        for n in 0..5 {
            publisher.publish(reading(n));
        }

        assert_eq!(slow.recv().await, Some(reading(3)));
        assert_eq!(slow.recv().await, Some(reading(4)));
        assert_eq!(slow.dropped(), 3);
        assert_eq!(slow.try_recv(), None);
    }

    #[tokio::test]
    async fn closes_when_publisher_is_dropped() {
        let publisher = ReadingPublisher::new(2);
        let mut sub = publisher.subscribe();
        publisher.publish(reading(1));
        drop(publisher);

        assert_eq!(sub.recv().await, Some(reading(1)));
        assert_eq!(sub.recv().await, None);
    }
}
