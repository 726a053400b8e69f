//! Relay event types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events broadcast to external observers
///
/// Serialized as `{"event": "...", "data": {...}}` with frame payloads
/// base64-encoded, matching what monitoring UIs consume.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RelayEvent {
    /// A frame was captured from a source (at most once per frame)
    #[serde(rename = "source.frame")]
    Frame {
        /// Source the frame came from
        source_id: String,
        /// Encoded JPEG payload
        #[serde(with = "crate::util::b64")]
        frame: Bytes,
        /// Capture wall-clock time
        timestamp: DateTime<Utc>,
    },

    /// A vehicle connected and its source was registered
    #[serde(rename = "source.connected")]
    SourceConnected { source_id: String },

    /// A source was disconnected and removed
    #[serde(rename = "source.disconnected")]
    SourceDisconnected { source_id: String },

    /// A source's ingest loop started
    #[serde(rename = "stream.started")]
    StreamStarted { source_id: String },

    /// A source's ingest loop stopped
    #[serde(rename = "stream.stopped")]
    StreamStopped {
        source_id: String,
        /// "stopped" for a control-plane stop, otherwise the fatal error
        reason: String,
    },
}

impl RelayEvent {
    /// Event name used for filtering and routing
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Frame { .. } => "source.frame",
            Self::SourceConnected { .. } => "source.connected",
            Self::SourceDisconnected { .. } => "source.disconnected",
            Self::StreamStarted { .. } => "stream.started",
            Self::StreamStopped { .. } => "stream.stopped",
        }
    }

    /// Source the event concerns
    pub fn source_id(&self) -> &str {
        match self {
            Self::Frame { source_id, .. }
            | Self::SourceConnected { source_id }
            | Self::SourceDisconnected { source_id }
            | Self::StreamStarted { source_id }
            | Self::StreamStopped { source_id, .. } => source_id,
        }
    }
}
