//! Particulate matter reading.
//!
//! A `Reading` is produced by the frame decoder once a frame has been
//! validated, persisted by the reading store and handed to subscribers.
//! It is never mutated after construction.

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use thiserror::Error;

/// Number of fractional-second digits kept on a reading timestamp.
/// Matches the precision the store persists.
pub const TIMESTAMP_PRECISION_DIGITS: u16 = 6;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
#[error("particulate concentrations must be finite and non-negative (pm2.5={pm25}, pm10={pm10})")]
pub struct InvalidReading {
    pub pm25: f64,
    pub pm10: f64,
}

/// One decoded measurement. Concentrations are in µg/m³.
///
/// `pm10 >= pm25` is not guaranteed: the sensor is noisy enough to
/// occasionally report a finer fraction larger than the coarser one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    timestamp: DateTime<Utc>,
    pm25: f64,
    pm10: f64,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, pm25: f64, pm10: f64) -> Result<Self, InvalidReading> {
        if !is_concentration(pm25) || !is_concentration(pm10) {
            return Err(InvalidReading { pm25, pm10 });
        }

        Ok(Self {
            timestamp: timestamp.trunc_subsecs(TIMESTAMP_PRECISION_DIGITS),
            pm25,
            pm10,
        })
    }

    /// Builds a reading from the raw sensor words, which count tenths of µg/m³.
    pub fn from_raw(timestamp: DateTime<Utc>, pm25_tenths: u16, pm10_tenths: u16) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(TIMESTAMP_PRECISION_DIGITS),
            pm25: f64::from(pm25_tenths) / 10.0,
            pm10: f64::from(pm10_tenths) / 10.0,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn pm25(&self) -> f64 {
        self.pm25
    }

    pub fn pm10(&self) -> f64 {
        self.pm10
    }
}

fn is_concentration(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn raw_words_are_tenths_of_micrograms() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let reading = Reading::from_raw(at, 45, 1234);
        assert_eq!(reading.pm25(), 4.5);
        assert_eq!(reading.pm10(), 123.4);
    }

    #[test]
    fn rejects_negative_and_non_finite_values() {
        let at = Utc::now();
        assert!(Reading::new(at, -0.1, 3.0).is_err());
        assert!(Reading::new(at, 1.0, f64::NAN).is_err());
        assert!(Reading::new(at, f64::INFINITY, 1.0).is_err());
    }

    #[test]
    fn pm10_may_be_smaller_than_pm25() {
        let reading = Reading::new(Utc::now(), 12.0, 8.0).unwrap();
        assert!(reading.pm10() < reading.pm25());
    }

    #[test]
    fn timestamps_are_truncated_to_microseconds() {
        let at = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        let reading = Reading::new(at, 1.0, 2.0).unwrap();
        assert_eq!(reading.timestamp().nanosecond(), 123_456_000);
    }
}
