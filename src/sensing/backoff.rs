use std::time::Duration;

use rand::Rng;

/// Exponential reconnect delay: doubles on every failed attempt up to `max`,
/// back to `initial` after a successful connect.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            next: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// Adds up to 10% random slack so several monitors do not retry in lockstep.
pub fn with_jitter(delay: Duration) -> Duration {
    let slack_ms = (delay.as_millis() / 10) as u64;
    if slack_ms == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=slack_ms))
}
