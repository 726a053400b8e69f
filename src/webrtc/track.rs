//! Track bridge between frame buffers and viewer sessions
//!
//! A [`TrackBridge`] adapts one source's frame buffer to the transport's
//! pull model. It is shared by every session viewing that source; each
//! session paces its own pulls against the same buffer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};
use webrtc::api::media_engine::MIME_TYPE_VP8;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::config::WebRtcConfig;
use crate::video::{convert, FrameBuffer, VideoFrame};

use super::signaling::SessionState;

/// 90 kHz RTP video clock
const VIDEO_CLOCK_RATE: u32 = 90_000;

struct PtsState {
    last_pts: u64,
    epoch: Instant,
}

/// Bridge from one source's frame buffer to its viewers' tracks
///
/// Each pull drains the freshest buffered frame, decodes it into the
/// transport's RGB24 layout, and stamps a strictly increasing presentation
/// timestamp. With nothing buffered (or on a decode error) it synthesizes
/// a black placeholder so the timestamp stream stays monotonic across
/// gaps. A pull never fails.
pub struct TrackBridge {
    source_id: String,
    buffer: Arc<FrameBuffer>,
    frame_rate: u32,
    placeholder: (u32, u32),
    pts: Mutex<PtsState>,
    frames_bridged: AtomicU64,
    placeholders: AtomicU64,
}

impl TrackBridge {
    /// Create a bridge over a source's frame buffer
    pub fn new(
        source_id: impl Into<String>,
        buffer: Arc<FrameBuffer>,
        config: &WebRtcConfig,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            buffer,
            frame_rate: config.frame_rate.max(1),
            placeholder: (config.placeholder_width, config.placeholder_height),
            pts: Mutex::new(PtsState {
                last_pts: 0,
                epoch: Instant::now(),
            }),
            frames_bridged: AtomicU64::new(0),
            placeholders: AtomicU64::new(0),
        }
    }

    /// Source this bridge serves
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Nominal duration of one frame at the pacing rate
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate as f64)
    }

    /// Pull the next frame for the transport
    pub fn next_frame(&self) -> VideoFrame {
        if let Some(encoded) = self.buffer.take_latest() {
            match convert::decode_jpeg(encoded.data()) {
                Ok((pixels, width, height)) => {
                    self.frames_bridged.fetch_add(1, Ordering::Relaxed);
                    return VideoFrame {
                        data: pixels,
                        width,
                        height,
                        pts: self.advance_pts(),
                        placeholder: false,
                    };
                }
                Err(e) => {
                    // A broken frame counts as no frame for this pull
                    debug!(source_id = %self.source_id, error = %e, "frame decode failed, substituting placeholder");
                }
            }
        }
        self.placeholder_frame()
    }

    fn pts_tick(&self) -> u64 {
        (VIDEO_CLOCK_RATE / self.frame_rate) as u64
    }

    fn advance_pts(&self) -> u64 {
        let mut state = self.pts.lock();
        state.last_pts += self.pts_tick();
        state.last_pts
    }

    fn placeholder_frame(&self) -> VideoFrame {
        let (width, height) = self.placeholder;
        let tick = self.pts_tick();
        let pts = {
            let mut state = self.pts.lock();
            // Wall clock scaled to the frame rate and snapped to frame
            // ticks, clamped so the stream stays strictly monotonic
            let elapsed = state.epoch.elapsed().as_secs_f64();
            let wall = (elapsed * self.frame_rate as f64) as u64 * tick;
            let pts = wall.max(state.last_pts + tick);
            state.last_pts = pts;
            pts
        };
        self.placeholders.fetch_add(1, Ordering::Relaxed);
        VideoFrame {
            data: convert::blank_rgb24(width, height),
            width,
            height,
            pts,
            placeholder: true,
        }
    }

    /// Create a session's outgoing track and start its pacing task
    ///
    /// The task waits for the transport to connect, then pulls one frame
    /// per pacing period until the session reaches `Closed`.
    pub fn attach(
        self: &Arc<Self>,
        session_id: &str,
        state_rx: watch::Receiver<SessionState>,
    ) -> Arc<TrackLocalStaticSample> {
        let capability = RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_string(),
            clock_rate: VIDEO_CLOCK_RATE,
            channels: 0,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        };
        let track = Arc::new(TrackLocalStaticSample::new(
            capability,
            format!("video-{}", self.source_id),
            format!("skyrelay-{session_id}"),
        ));
        spawn_session_sender(
            Arc::clone(self),
            Arc::clone(&track),
            session_id.to_string(),
            state_rx,
        );
        track
    }

    /// Bridge statistics snapshot
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            frames_bridged: self.frames_bridged.load(Ordering::Relaxed),
            placeholders: self.placeholders.load(Ordering::Relaxed),
        }
    }
}

/// Bridge statistics snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct BridgeStats {
    /// Buffered frames decoded and handed to the transport
    pub frames_bridged: u64,
    /// Placeholder frames synthesized for empty pulls
    pub placeholders: u64,
}

/// Per-session pacing task writing pulled frames into the sample track
fn spawn_session_sender(
    bridge: Arc<TrackBridge>,
    track: Arc<TrackLocalStaticSample>,
    session_id: String,
    mut state_rx: watch::Receiver<SessionState>,
) {
    tokio::spawn(async move {
        // Hold off until the transport reports connected
        loop {
            match *state_rx.borrow() {
                SessionState::Connected => break,
                SessionState::Closed => return,
                _ => {}
            }
            if state_rx.changed().await.is_err() {
                return;
            }
        }

        info!(session_id = %session_id, source_id = %bridge.source_id, "track sender started");
        let duration = bridge.frame_duration();
        let mut ticker = tokio::time::interval(duration);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *state_rx.borrow() == SessionState::Closed {
                        break;
                    }
                    let frame = bridge.next_frame();
                    let sample = Sample {
                        data: frame.data.clone(),
                        duration,
                        packet_timestamp: frame.pts as u32,
                        ..Default::default()
                    };
                    if let Err(e) = track.write_sample(&sample).await {
                        debug!(session_id = %session_id, error = %e, "sample write failed");
                    }
                }
                changed = state_rx.changed() => {
                    if changed.is_err() || *state_rx.borrow() == SessionState::Closed {
                        break;
                    }
                }
            }
        }

        info!(session_id = %session_id, "track sender stopped");
    });
}

/// Shared bridges, one per source with at least one viewer
///
/// Holds weak references: a bridge lives exactly as long as some session
/// (or its sender task) holds it, and is recreated on the next demand.
pub struct BridgeRegistry {
    config: WebRtcConfig,
    bridges: Mutex<HashMap<String, Weak<TrackBridge>>>,
}

impl BridgeRegistry {
    /// Create an empty registry
    pub fn new(config: WebRtcConfig) -> Self {
        Self {
            config,
            bridges: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the bridge for a source, creating it when absent
    pub fn get_or_create(&self, source_id: &str, buffer: Arc<FrameBuffer>) -> Arc<TrackBridge> {
        let mut bridges = self.bridges.lock();
        bridges.retain(|_, bridge| bridge.strong_count() > 0);

        if let Some(bridge) = bridges.get(source_id).and_then(Weak::upgrade) {
            return bridge;
        }

        let bridge = Arc::new(TrackBridge::new(source_id, buffer, &self.config));
        bridges.insert(source_id.to_string(), Arc::downgrade(&bridge));
        bridge
    }

    /// Number of bridges still referenced by at least one session
    pub fn live_count(&self) -> usize {
        self.bridges
            .lock()
            .values()
            .filter(|bridge| bridge.strong_count() > 0)
            .count()
    }
}
