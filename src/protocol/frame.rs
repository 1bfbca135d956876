//! SDS011 measurement frame decoding.
//!
//! Layout of the 10-byte frame:
//!
//! | offset | content                      |
//! |--------|------------------------------|
//! | 0      | start marker `0xAA`          |
//! | 1      | command marker `0xC0`        |
//! | 2..4   | PM2.5, little endian, x10    |
//! | 4..6   | PM10, little endian, x10     |
//! | 6..8   | reserved                     |
//! | 8      | device id (ignored)          |
//! | 9      | checksum of bytes 2..8       |

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::Reading;

pub const FRAME_LEN: usize = 10;
pub const START_MARKER: u8 = 0xAA;
pub const COMMAND_MARKER: u8 = 0xC0;

const PAYLOAD: std::ops::Range<usize> = 2..8;
const CHECKSUM_OFFSET: usize = 9;

pub type Frame = [u8; FRAME_LEN];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame must be {FRAME_LEN} bytes, got {len}")]
    Framing { len: usize },

    #[error("frame markers out of sync: got {found:02X?}")]
    Sync { found: [u8; 2] },

    #[error("checksum mismatch: computed {expected:#04x}, frame carries {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },
}

impl DecodeError {
    /// Sync and checksum failures clear up on the next frame; a framing
    /// error means the caller handed over the wrong buffer.
    pub fn is_transient(&self) -> bool {
        matches!(self, DecodeError::Sync { .. } | DecodeError::Checksum { .. })
    }
}

pub fn is_frame_start(first: u8, second: u8) -> bool {
    first == START_MARKER && second == COMMAND_MARKER
}

/// Modulo-256 sum of the payload bytes.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte))
}

/// Decodes `buffer` into a reading stamped with `timestamp`.
///
/// The sensor does not transmit a clock, so the time of decode is supplied
/// by the caller.
pub fn decode(buffer: &[u8], timestamp: DateTime<Utc>) -> Result<Reading, DecodeError> {
    if buffer.len() != FRAME_LEN {
        return Err(DecodeError::Framing { len: buffer.len() });
    }

    if !is_frame_start(buffer[0], buffer[1]) {
        return Err(DecodeError::Sync {
            found: [buffer[0], buffer[1]],
        });
    }

    let expected = checksum(&buffer[PAYLOAD]);
    let actual = buffer[CHECKSUM_OFFSET];
    if expected != actual {
        return Err(DecodeError::Checksum { expected, actual });
    }

    let pm25 = u16::from_le_bytes([buffer[2], buffer[3]]);
    let pm10 = u16::from_le_bytes([buffer[4], buffer[5]]);

    Ok(Reading::from_raw(timestamp, pm25, pm10))
}

#[cfg(test)]
pub(crate) fn encode(pm25_tenths: u16, pm10_tenths: u16) -> Frame {
    let [p25_lo, p25_hi] = pm25_tenths.to_le_bytes();
    let [p10_lo, p10_hi] = pm10_tenths.to_le_bytes();
    let mut frame = [
        START_MARKER,
        COMMAND_MARKER,
        p25_lo,
        p25_hi,
        p10_lo,
        p10_hi,
        0x00,
        0x00,
        0x00,
        0x00,
    ];
    frame[CHECKSUM_OFFSET] = checksum(&frame[PAYLOAD]);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn decodes_reference_frame() {
        let frame = [0xAA, 0xC0, 0x2D, 0x00, 0x5A, 0x00, 0x00, 0x00, 0x00, 0x87];
        let reading = decode(&frame, now()).unwrap();
        assert_eq!(reading.pm25(), 4.5);
        assert_eq!(reading.pm10(), 9.0);
    }

    #[test]
    fn wrong_lengths_are_framing_errors() {
        let long = [0u8; 32];
        for len in [0usize, 1, 9, 11, 19, 32] {
            assert_eq!(
                decode(&long[..len], now()),
                Err(DecodeError::Framing { len })
            );
        }
    }

    #[test]
    fn marker_mismatch_is_sync_error() {
        let mut frame = encode(10, 20);
        frame[1] = 0xC5;
        assert_eq!(
            decode(&frame, now()),
            Err(DecodeError::Sync { found: [0xAA, 0xC5] })
        );

        let mut frame = encode(10, 20);
        frame[0] = 0x00;
        assert!(matches!(decode(&frame, now()), Err(DecodeError::Sync { .. })));
    }

    #[test]
    fn off_by_one_checksum_never_yields_a_reading() {
        for (pm25, pm10) in [(0u16, 0u16), (45, 90), (255, 256), (999, 1999), (u16::MAX, u16::MAX)] {
            let mut frame = encode(pm25, pm10);
            let good = frame[CHECKSUM_OFFSET];
            frame[CHECKSUM_OFFSET] = good.wrapping_add(1);
            let err = decode(&frame, now()).unwrap_err();
            assert_eq!(
                err,
                DecodeError::Checksum {
                    expected: good,
                    actual: good.wrapping_add(1)
                }
            );
            assert!(err.is_transient());
        }
    }

    #[test]
    fn valid_frames_decode_exactly() {
        for (pm25, pm10) in [(1u16, 2u16), (300, 301), (4000, 9999), (u16::MAX, 0)] {
            let reading = decode(&encode(pm25, pm10), now()).unwrap();
            assert_eq!(reading.pm25(), f64::from(pm25) / 10.0);
            assert_eq!(reading.pm10(), f64::from(pm10) / 10.0);
        }
    }

    #[test]
    fn device_id_byte_is_ignored() {
        let mut frame = encode(45, 90);
        frame[8] = 0x7F;
        assert!(decode(&frame, now()).is_ok());
    }

    #[test]
    fn checksum_wraps_modulo_256() {
        assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
        assert_eq!(checksum(&[]), 0x00);
    }

    #[test]
    fn framing_errors_are_not_transient() {
        assert!(!DecodeError::Framing { len: 3 }.is_transient());
    }
}
