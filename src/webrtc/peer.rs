//! WebRTC peer session
//!
//! Wraps one viewer's `RTCPeerConnection`: offer/answer negotiation,
//! connectivity candidates, lifecycle state, and teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::config::WebRtcConfig;
use crate::error::{RelayError, Result};

use super::signaling::{CandidateInfo, SessionState};
use super::track::TrackBridge;

/// How long to wait for ICE gathering before answering anyway
const GATHERING_TIMEOUT: Duration = Duration::from_secs(2);

/// One viewer's negotiated transport connection
pub struct PeerSession {
    /// Session id
    pub id: String,
    /// Source this session is bound to; immutable after creation
    pub source_id: String,
    pc: Arc<RTCPeerConnection>,
    bridge: Arc<TrackBridge>,
    state_tx: Arc<watch::Sender<SessionState>>,
    state_rx: watch::Receiver<SessionState>,
    /// Candidates arriving before the remote description are parked here
    /// and flushed right after it is applied
    pending_candidates: Mutex<Option<Vec<RTCIceCandidateInit>>>,
    closed: AtomicBool,
}

impl PeerSession {
    /// Create a fresh peer connection for one viewer
    pub async fn new(
        config: &WebRtcConfig,
        id: String,
        source_id: String,
        bridge: Arc<TrackBridge>,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| RelayError::WebRtc(format!("failed to register codecs: {e}")))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| RelayError::WebRtc(format!("failed to register interceptors: {e}")))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let mut ice_servers = Vec::new();
        for stun_url in &config.stun_servers {
            ice_servers.push(RTCIceServer {
                urls: vec![stun_url.clone()],
                ..Default::default()
            });
        }
        for turn in &config.turn_servers {
            ice_servers.push(RTCIceServer {
                urls: turn.urls.clone(),
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            });
        }

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
            RelayError::WebRtc(format!("failed to create peer connection: {e}"))
        })?);

        let (state_tx, state_rx) = watch::channel(SessionState::New);
        let state_tx = Arc::new(state_tx);

        {
            let state_tx = Arc::clone(&state_tx);
            let session_id = id.clone();
            pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let state_tx = Arc::clone(&state_tx);
                let session_id = session_id.clone();
                Box::pin(async move {
                    let new_state = match s {
                        RTCPeerConnectionState::New => SessionState::New,
                        RTCPeerConnectionState::Connecting => SessionState::Negotiating,
                        RTCPeerConnectionState::Connected => SessionState::Connected,
                        RTCPeerConnectionState::Disconnected
                        | RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Closed => SessionState::Closed,
                        _ => return,
                    };
                    debug!(session_id = %session_id, state = %new_state, "transport state changed");
                    let _ = state_tx.send(new_state);
                })
            }));
        }

        Ok(Self {
            id,
            source_id,
            pc,
            bridge,
            state_tx,
            state_rx,
            pending_candidates: Mutex::new(Some(Vec::new())),
            closed: AtomicBool::new(false),
        })
    }

    /// Apply the viewer's offer, attach the source track, return the
    /// answer SDP
    ///
    /// ICE gathering is awaited (bounded) before answering because the
    /// wire protocol has no server-to-viewer trickle path; the answer has
    /// to carry our candidates.
    pub async fn handle_offer(&self, offer_sdp: String) -> Result<String> {
        let offer = RTCSessionDescription::offer(offer_sdp)
            .map_err(|e| RelayError::Signaling(format!("invalid SDP offer: {e}")))?;

        self.pc
            .set_remote_description(offer)
            .await
            .map_err(|e| RelayError::WebRtc(format!("failed to set remote description: {e}")))?;
        let _ = self.state_tx.send(SessionState::Negotiating);

        // Candidates that raced ahead of the offer can be applied now
        let parked = self.pending_candidates.lock().await.take().unwrap_or_default();
        for candidate in parked {
            if let Err(e) = self.pc.add_ice_candidate(candidate).await {
                debug!(session_id = %self.id, error = %e, "buffered candidate rejected");
            }
        }

        // The track must be attached before the answer so it gets
        // negotiated into the session
        let track = self.bridge.attach(&self.id, self.state_rx.clone());
        self.pc
            .add_track(track)
            .await
            .map_err(|e| RelayError::WebRtc(format!("failed to add video track: {e}")))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| RelayError::WebRtc(format!("failed to create answer: {e}")))?;

        let mut gathering_done = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| RelayError::WebRtc(format!("failed to set local description: {e}")))?;
        let _ = tokio::time::timeout(GATHERING_TIMEOUT, gathering_done.recv()).await;

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| RelayError::WebRtc("no local description after answer".to_string()))?;

        info!(session_id = %self.id, source_id = %self.source_id, "handshake answered");
        Ok(local.sdp)
    }

    /// Apply a viewer connectivity candidate
    ///
    /// Before the remote description is applied the candidate is buffered;
    /// afterwards it goes straight to the transport.
    pub async fn add_ice_candidate(&self, candidate: &CandidateInfo) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.to_sdp_line(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        };

        {
            let mut pending = self.pending_candidates.lock().await;
            if let Some(parked) = pending.as_mut() {
                parked.push(init);
                debug!(session_id = %self.id, "candidate buffered until remote description");
                return Ok(());
            }
        }

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| RelayError::WebRtc(format!("failed to add ICE candidate: {e}")))
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Subscribe to session state changes
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Close the transport and release session resources
    ///
    /// Safe to call multiple times; only the first call does any work.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.state_tx.send(SessionState::Closed);
        if let Err(e) = self.pc.close().await {
            debug!(session_id = %self.id, error = %e, "peer connection close failed");
        }
        info!(session_id = %self.id, source_id = %self.source_id, "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::FrameBuffer;

    async fn session() -> PeerSession {
        let config = WebRtcConfig::default();
        let buffer = Arc::new(FrameBuffer::new(4));
        let bridge = Arc::new(TrackBridge::new("drone-1", buffer, &config));
        PeerSession::new(&config, "session-1".to_string(), "drone-1".to_string(), bridge)
            .await
            .unwrap()
    }

    fn candidate() -> CandidateInfo {
        CandidateInfo {
            component: 1,
            foundation: "8421".to_string(),
            ip: "192.168.1.20".to_string(),
            port: 54321,
            priority: 2_130_706_431,
            protocol: "udp".to_string(),
            candidate_type: "host".to_string(),
        }
    }

    #[tokio::test]
    async fn test_new_session_state() {
        let session = session().await;
        assert_eq!(session.state(), SessionState::New);
        assert_eq!(session.source_id, "drone-1");
    }

    #[tokio::test]
    async fn test_candidate_before_remote_description_is_buffered() {
        let session = session().await;

        // Without a remote description the transport would reject this;
        // the session parks it instead
        session.add_ice_candidate(&candidate()).await.unwrap();
        session.add_ice_candidate(&candidate()).await.unwrap();

        let parked = session.pending_candidates.lock().await;
        assert_eq!(parked.as_ref().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_invalid_offer_rejected() {
        let session = session().await;
        let result = session.handle_offer(String::new()).await;
        assert!(matches!(result, Err(RelayError::Signaling(_))));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let session = session().await;
        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);

        // A second close must be a no-op, not an error or panic
        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
    }
}
