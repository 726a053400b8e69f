//! Signaling wire types
//!
//! JSON messages exchanged with each viewer over the WebSocket channel,
//! plus the session lifecycle states consumed by the registry.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Messages carried on the signaling channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// SDP offer opening a session for one source
    Offer(SessionOffer),
    /// SDP answer back to the viewer
    Answer(SessionAnswer),
    /// Connectivity candidate, applied best-effort
    IceCandidate(CandidateInfo),
    /// Externally produced frame injected into a source's pipeline
    Frame(FrameInject),
}

/// SDP offer from a viewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOffer {
    /// SDP content
    pub sdp: String,
    /// Source the viewer wants to watch
    pub source_id: String,
}

/// SDP answer to a viewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAnswer {
    /// SDP content
    pub sdp: String,
}

/// ICE candidate fields as they appear on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateInfo {
    /// Component id (1 = RTP)
    pub component: u16,
    /// Candidate foundation
    pub foundation: String,
    /// Connection address
    pub ip: String,
    /// Connection port
    pub port: u16,
    /// Candidate priority
    pub priority: u32,
    /// Transport protocol ("udp" or "tcp")
    pub protocol: String,
    /// Candidate type ("host", "srflx", "prflx", "relay")
    pub candidate_type: String,
}

impl CandidateInfo {
    /// Assemble the standard SDP `candidate:` attribute line the transport
    /// library parses
    pub fn to_sdp_line(&self) -> String {
        format!(
            "candidate:{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.protocol,
            self.priority,
            self.ip,
            self.port,
            self.candidate_type
        )
    }
}

/// Encoded frame pushed over the signaling channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameInject {
    /// Source the frame belongs to
    pub source_id: String,
    /// JPEG payload, base64 on the wire
    #[serde(with = "crate::util::b64")]
    pub frame_data: Bytes,
}

/// Viewer session lifecycle
///
/// Driven by the transport's connection state callbacks. `Closed` is the
/// only terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    New,
    Negotiating,
    Connected,
    Closed,
}

impl SessionState {
    /// Whether this state ends the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::New => write!(f, "new"),
            SessionState::Negotiating => write!(f, "negotiating"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_wire_format() {
        let json = r#"{"type":"offer","sdp":"v=0","source_id":"drone-1"}"#;
        let message: SignalMessage = serde_json::from_str(json).unwrap();
        match message {
            SignalMessage::Offer(offer) => {
                assert_eq!(offer.sdp, "v=0");
                assert_eq!(offer.source_id, "drone-1");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_answer_wire_format() {
        let message = SignalMessage::Answer(SessionAnswer {
            sdp: "v=0".to_string(),
        });
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains(r#""type":"answer""#));
        assert!(json.contains(r#""sdp":"v=0""#));
    }

    #[test]
    fn test_candidate_wire_format() {
        let json = r#"{
            "type": "ice-candidate",
            "component": 1,
            "foundation": "8421",
            "ip": "192.168.1.20",
            "port": 54321,
            "priority": 2130706431,
            "protocol": "udp",
            "candidate_type": "host"
        }"#;
        let message: SignalMessage = serde_json::from_str(json).unwrap();
        let candidate = match message {
            SignalMessage::IceCandidate(candidate) => candidate,
            other => panic!("unexpected message: {other:?}"),
        };

        assert_eq!(
            candidate.to_sdp_line(),
            "candidate:8421 1 udp 2130706431 192.168.1.20 54321 typ host"
        );
    }

    #[test]
    fn test_frame_wire_format() {
        // base64 of FF D8 FF D9
        let json = r#"{"type":"frame","source_id":"drone-1","frame_data":"/9j//Q=="}"#;
        let message: SignalMessage = serde_json::from_str(json).unwrap();
        match message {
            SignalMessage::Frame(inject) => {
                assert_eq!(inject.source_id, "drone-1");
                assert_eq!(inject.frame_data.as_ref(), &[0xFF, 0xD8, 0xFF, 0xFD]);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_message_rejected() {
        assert!(serde_json::from_str::<SignalMessage>("{\"type\":\"bogus\"}").is_err());
        assert!(serde_json::from_str::<SignalMessage>("not json").is_err());
    }

    #[test]
    fn test_session_state_terminal() {
        assert!(SessionState::Closed.is_terminal());
        assert!(!SessionState::Connected.is_terminal());
        assert_eq!(SessionState::Negotiating.to_string(), "negotiating");
    }
}
