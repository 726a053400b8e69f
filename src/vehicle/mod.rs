//! Vehicle SDK seam
//!
//! The concrete vehicle protocol lives outside this crate. Implementations
//! of [`VehicleLink`] wrap an SDK connection to one vehicle; its video feed
//! is handed to the ingest loop as a [`VideoFeed`].

pub mod link;
pub mod telemetry;

pub use link::{VehicleLink, VideoFeed};
pub use telemetry::{VehicleStatus, Velocity};
