//! Video frame data structures

use bytes::Bytes;
use std::time::Instant;

/// A raw frame as produced by a vehicle's video feed
///
/// Pixel data is tightly packed RGB24 (no stride padding).
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Pixel data, `width * height * 3` bytes
    pub data: Bytes,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl RawFrame {
    /// Create a raw frame, checking the buffer matches the geometry
    pub fn new(data: Bytes, width: u32, height: u32) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) * 3 {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
        })
    }
}

/// An encoded (JPEG) frame awaiting consumption
///
/// Immutable once produced. Ownership moves from the producer into a
/// [`super::FrameBuffer`], which may discard it without any consumer
/// observing it; consumers must tolerate gaps.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    data: Bytes,
    /// Monotonic per-source sequence number
    pub sequence: u64,
    /// When the frame was captured
    pub capture_ts: Instant,
}

impl EncodedFrame {
    /// Create a new encoded frame captured now
    pub fn new(data: Bytes, sequence: u64) -> Self {
        Self {
            data,
            sequence,
            capture_ts: Instant::now(),
        }
    }

    /// Frame data as a byte slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Frame data as `Bytes` (cheap clone)
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Encoded size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Time since capture
    pub fn age(&self) -> std::time::Duration {
        self.capture_ts.elapsed()
    }

    /// Cheap sanity check on the JPEG start-of-image marker
    ///
    /// Enough to reject garbage injected over the signaling channel before
    /// it reaches a buffer; full validation happens at decode time.
    pub fn looks_like_jpeg(&self) -> bool {
        self.data.len() >= 4 && self.data[0] == 0xFF && self.data[1] == 0xD8
    }
}

/// A decoded frame in the transport's raw pixel layout
///
/// Produced by the track bridge on each pull: RGB24 pixels plus a strictly
/// increasing presentation timestamp in 90 kHz clock units.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB24 pixel data
    pub data: Bytes,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Presentation timestamp, 90 kHz units, strictly increasing per bridge
    pub pts: u64,
    /// True when this frame was synthesized because no frame was buffered
    pub placeholder: bool,
}

impl VideoFrame {
    /// Pixel data length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the pixel buffer is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_frame_geometry_check() {
        let ok = RawFrame::new(Bytes::from(vec![0u8; 2 * 2 * 3]), 2, 2);
        assert!(ok.is_some());

        let bad = RawFrame::new(Bytes::from(vec![0u8; 5]), 2, 2);
        assert!(bad.is_none());
    }

    #[test]
    fn test_encoded_frame_jpeg_marker() {
        let jpeg = EncodedFrame::new(Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]), 0);
        assert!(jpeg.looks_like_jpeg());

        let noise = EncodedFrame::new(Bytes::from_static(b"nope"), 1);
        assert!(!noise.looks_like_jpeg());

        let short = EncodedFrame::new(Bytes::from_static(&[0xFF]), 2);
        assert!(!short.looks_like_jpeg());
    }
}
