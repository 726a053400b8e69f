//! Bounded latest-frames buffer
//!
//! One buffer per source, written by that source's ingest loop and drained
//! by the track bridge. Overflow evicts the oldest frame so the producer
//! never blocks; `take_latest` consumes the newest frame and discards the
//! rest, so consumers always observe monotonically non-decreasing
//! freshness even when they skip frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::frame::EncodedFrame;

/// Bounded buffer holding the newest encoded frames of one source
pub struct FrameBuffer {
    frames: Mutex<VecDeque<EncodedFrame>>,
    capacity: usize,
    /// Frames evicted by `put` under a full buffer
    evicted: AtomicU64,
    /// Older frames discarded when a consumer took the latest
    skipped: AtomicU64,
}

impl FrameBuffer {
    /// Create a buffer with the given capacity
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be > 0");
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            evicted: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Insert a frame, evicting the oldest entry if the buffer is full
    ///
    /// Never blocks and never signals backpressure to the producer.
    pub fn put(&self, frame: EncodedFrame) {
        let mut frames = self.frames.lock();
        if frames.len() == self.capacity {
            frames.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        frames.push_back(frame);
    }

    /// Take the most recently inserted frame, consuming the buffer contents
    ///
    /// Returns `None` when no unconsumed frame is present. Older frames
    /// still buffered are discarded: the next call sees only what was
    /// inserted after this one.
    pub fn take_latest(&self) -> Option<EncodedFrame> {
        let mut frames = self.frames.lock();
        let latest = frames.pop_back();
        if latest.is_some() && !frames.is_empty() {
            self.skipped
                .fetch_add(frames.len() as u64, Ordering::Relaxed);
            frames.clear();
        }
        latest
    }

    /// Number of buffered frames
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    /// Whether the buffer holds no frames
    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames evicted by `put` under a full buffer
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Older frames discarded by `take_latest`
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Drop all buffered frames
    pub fn clear(&self) {
        self.frames.lock().clear();
    }
}
