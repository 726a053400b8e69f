//! Relay configuration
//!
//! Plain data structs with defaults. Loading these from a file or CLI is
//! the embedding application's job.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Top-level relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Frame ingest settings (per source)
    pub ingest: IngestConfig,
    /// WebRTC transport settings
    pub webrtc: WebRtcConfig,
    /// Signaling channel settings
    pub signaling: SignalingConfig,
}

/// Per-source frame ingest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Target capture cadence in frames per second
    pub fps: u32,
    /// JPEG quality (1-100) applied when encoding captured frames
    pub jpeg_quality: u8,
    /// Frame buffer capacity; the oldest frame is evicted on overflow
    pub buffer_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            jpeg_quality: 80,
            buffer_capacity: 30,
        }
    }
}

impl IngestConfig {
    /// Set the capture cadence
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the buffer capacity
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Duration of one capture period
    pub fn period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// WebRTC transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebRtcConfig {
    /// STUN server URLs
    ///
    /// Empty by default: host candidates are enough on a local network.
    pub stun_servers: Vec<String>,
    /// TURN server configuration
    pub turn_servers: Vec<TurnServer>,
    /// Frame rate each session's track is paced at
    pub frame_rate: u32,
    /// Placeholder frame width when a source has no frame buffered
    pub placeholder_width: u32,
    /// Placeholder frame height
    pub placeholder_height: u32,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![],
            turn_servers: vec![],
            frame_rate: 30,
            placeholder_width: 640,
            placeholder_height: 480,
        }
    }
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServer {
    /// TURN server URLs; multiple URLs allow fallback between transports
    pub urls: Vec<String>,
    /// Username for TURN authentication
    pub username: String,
    /// Credential for TURN authentication
    pub credential: String,
}

/// Signaling channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// Address the WebSocket signaling listener binds to
    pub bind_addr: SocketAddr,
    /// Maximum concurrent viewer sessions (0 = unlimited)
    pub max_sessions: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_sessions: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.ingest.fps, 30);
        assert_eq!(config.ingest.buffer_capacity, 30);
        assert_eq!(config.webrtc.frame_rate, 30);
        assert_eq!(config.signaling.bind_addr.port(), 8000);
    }

    #[test]
    fn test_ingest_period() {
        let config = IngestConfig::default().with_fps(30);
        let period = config.period();
        assert!(period.as_millis() >= 33 && period.as_millis() <= 34);

        // fps of zero must not divide by zero
        let config = IngestConfig::default().with_fps(0);
        assert_eq!(config.period().as_secs(), 1);
    }
}
