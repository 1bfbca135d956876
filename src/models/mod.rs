pub mod reading;

pub use reading::{InvalidReading, Reading};
