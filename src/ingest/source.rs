//! Per-source frame ingest loop
//!
//! One loop per streaming source: read a raw frame from the vehicle feed
//! at the capture cadence, JPEG-encode it, push it into the source's
//! frame buffer, and publish it on the event bus. Nothing on this path
//! ever waits on a consumer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::IngestConfig;
use crate::events::{EventBus, RelayEvent};
use crate::vehicle::VideoFeed;
use crate::video::convert;
use crate::video::{EncodedFrame, FrameBuffer};

/// Counters shared between an ingest loop and its source entry
#[derive(Default)]
pub struct IngestCounters {
    captured: AtomicU64,
    skipped: AtomicU64,
    encode_failures: AtomicU64,
}

impl IngestCounters {
    pub fn snapshot(&self) -> IngestStats {
        IngestStats {
            frames_captured: self.captured.load(Ordering::Relaxed),
            frames_skipped: self.skipped.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
        }
    }
}

/// Ingest statistics snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    /// Frames captured, encoded, and buffered
    pub frames_captured: u64,
    /// Cycles where the feed had no frame ready
    pub frames_skipped: u64,
    /// Frames dropped because encoding failed
    pub encode_failures: u64,
}

/// Spawn the ingest loop for one source
///
/// The loop runs until `streaming` is cleared (observed within one capture
/// period; no `put` happens after the flag is seen cleared) or the feed
/// reports a fatal error, in which case the source is marked inactive and
/// a restart requires an explicit start-stream command.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_ingest_loop(
    source_id: String,
    mut feed: Box<dyn VideoFeed>,
    buffer: Arc<FrameBuffer>,
    events: EventBus,
    streaming: Arc<AtomicBool>,
    sequence: Arc<AtomicU64>,
    counters: Arc<IngestCounters>,
    config: IngestConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.period());
        // A stalled feed must not be followed by a burst of catch-up ticks
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!(source_id = %source_id, fps = config.fps, "ingest loop started");

        let reason = loop {
            ticker.tick().await;
            if !streaming.load(Ordering::Relaxed) {
                break "stopped".to_string();
            }

            let raw = match feed.next_frame().await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    counters.skipped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                Err(e) => {
                    warn!(source_id = %source_id, error = %e, "video feed lost, stopping ingest");
                    break e.to_string();
                }
            };

            let jpeg =
                match convert::encode_jpeg(&raw.data, raw.width, raw.height, config.jpeg_quality)
                {
                    Ok(jpeg) => jpeg,
                    Err(e) => {
                        counters.encode_failures.fetch_add(1, Ordering::Relaxed);
                        debug!(source_id = %source_id, error = %e, "frame encode failed, skipping cycle");
                        continue;
                    }
                };

            // The flag may have been cleared while reading the feed
            if !streaming.load(Ordering::Relaxed) {
                break "stopped".to_string();
            }

            let frame = EncodedFrame::new(jpeg, sequence.fetch_add(1, Ordering::Relaxed));
            let payload = frame.data_bytes();
            buffer.put(frame);
            counters.captured.fetch_add(1, Ordering::Relaxed);

            events.publish(RelayEvent::Frame {
                source_id: source_id.clone(),
                frame: payload,
                timestamp: Utc::now(),
            });
        };

        streaming.store(false, Ordering::Relaxed);
        events.publish(RelayEvent::StreamStopped {
            source_id: source_id.clone(),
            reason,
        });
        debug!(source_id = %source_id, "ingest loop stopped");
    })
}
