//! Domain model and collaborator contracts shared across the publisher
//! workspace:
//! - [`model`]: `User`, `Draft`, `Automation`, `ScheduleRule`, and friends.
//! - [`error`]: the unified [`error::PublisherError`] taxonomy.
//! - [`ports`]: `Persistence`/`BlobStore`/`AlertSink`/`Clock` collaborator
//!   seams, plus in-memory test doubles.

pub mod error;
pub mod model;
pub mod ports;

pub use error::PublisherError;
pub use ports::{AlertSink, BlobStore, Clock, ManualClock, Persistence, SystemClock};
