//! Acquisition loop: connect, poll, decode, persist, publish.

mod backoff;
mod config;
mod controller;
mod loop_worker;
mod publisher;
mod status;

pub use backoff::Backoff;
pub use config::AcquisitionConfig;
pub use controller::AcquisitionController;
pub use publisher::{ReadingPublisher, ReadingSubscription, DEFAULT_SUBSCRIBER_CAPACITY};
pub use status::{AcquisitionStatus, StatusBoard};
