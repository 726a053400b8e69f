//! Vehicle connection and video feed traits

use async_trait::async_trait;

use crate::error::Result;
use crate::video::RawFrame;
use super::telemetry::VehicleStatus;

/// A live video feed from one vehicle
///
/// Returned by [`VehicleLink::stream_on`] and consumed by that source's
/// ingest loop at its capture cadence.
#[async_trait]
pub trait VideoFeed: Send {
    /// Read the next raw frame
    ///
    /// `Ok(Some(frame))` delivers a frame; `Ok(None)` means no frame was
    /// available this cycle (a transient condition, the caller skips the
    /// cycle); `Err` means the feed is permanently gone and the ingest
    /// loop must terminate.
    async fn next_frame(&mut self) -> Result<Option<RawFrame>>;
}

/// Control link to one vehicle
///
/// Implemented outside this crate against the actual vehicle SDK. All
/// methods may suspend on network I/O.
#[async_trait]
pub trait VehicleLink: Send + Sync {
    /// Establish the control connection
    async fn connect(&mut self) -> Result<()>;

    /// Query live telemetry
    async fn status(&self) -> Result<VehicleStatus>;

    /// Turn the onboard video stream on and return its feed
    async fn stream_on(&mut self) -> Result<Box<dyn VideoFeed>>;

    /// Turn the onboard video stream off
    async fn stream_off(&mut self) -> Result<()>;

    /// Release the control connection
    async fn disconnect(&mut self) -> Result<()>;
}
