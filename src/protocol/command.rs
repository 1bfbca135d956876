//! Host-to-sensor commands.
//!
//! Only the "query data" request is ever sent. A sensor switched to
//! query mode stays silent until it receives it, then answers with one
//! measurement frame.

/// SDS011 query-data request addressed to any device (`FF FF`).
pub const QUERY_DATA: [u8; 19] = [
    0xAA, 0xB4, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF,
    0x02, 0x03, 0x01, 0xAB,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_command_is_framed_by_head_and_tail() {
        assert_eq!(QUERY_DATA[0], 0xAA);
        assert_eq!(QUERY_DATA[1], 0xB4);
        assert_eq!(QUERY_DATA[QUERY_DATA.len() - 1], 0xAB);
    }
}
