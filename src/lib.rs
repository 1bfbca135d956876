//! Sensor acquisition and persistence for an SDS011 air-quality monitor.
//!
//! Bytes from the serial [`link`] are framed and checked by [`protocol`],
//! turned into [`models::Reading`]s by the [`sensing`] loop, written to the
//! [`db`] and fanned out to subscribers.

pub mod db;
pub mod link;
pub mod models;
pub mod protocol;
pub mod sensing;
pub mod settings;
pub mod utils;

pub use db::{Database, InsertOutcome, StoreError, StoreOptions};
pub use link::{ConnectionError, ConnectionReason, Connector, DeviceSelector, FrameLink, LinkError};
pub use models::Reading;
pub use protocol::DecodeError;
pub use sensing::{AcquisitionConfig, AcquisitionController, AcquisitionStatus, ReadingSubscription};
pub use settings::Settings;
