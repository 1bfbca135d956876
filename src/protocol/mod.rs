pub mod command;
pub mod frame;

pub use frame::{checksum, decode, is_frame_start, DecodeError, Frame, FRAME_LEN};
