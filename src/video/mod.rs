//! Frame types, buffering, and pixel conversion
//!
//! Encoded frames flow from the ingest loops into per-source
//! [`FrameBuffer`]s; the WebRTC bridge drains them and converts to the
//! transport's raw pixel layout.

pub mod buffer;
pub mod convert;
pub mod frame;

pub use buffer::FrameBuffer;
pub use frame::{EncodedFrame, RawFrame, VideoFrame};
