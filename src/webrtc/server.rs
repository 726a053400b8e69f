//! WebSocket signaling server
//!
//! One connection per viewer. Drives the offer/answer handshake, applies
//! connectivity candidates, accepts injected frames, and tears the
//! session down when the socket goes away.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{SignalingConfig, WebRtcConfig};
use crate::error::Result;
use crate::ingest::SourceManager;

use super::peer::PeerSession;
use super::session::SessionRegistry;
use super::signaling::{CandidateInfo, SessionAnswer, SessionOffer, SignalMessage};
use super::track::BridgeRegistry;

/// Signaling endpoint accepting one WebSocket connection per viewer
pub struct SignalingServer {
    config: SignalingConfig,
    webrtc: WebRtcConfig,
    sources: Arc<SourceManager>,
    sessions: Arc<SessionRegistry>,
    bridges: Arc<BridgeRegistry>,
}

impl SignalingServer {
    /// Create a server over shared relay state
    pub fn new(
        config: SignalingConfig,
        webrtc: WebRtcConfig,
        sources: Arc<SourceManager>,
        sessions: Arc<SessionRegistry>,
        bridges: Arc<BridgeRegistry>,
    ) -> Self {
        Self {
            config,
            webrtc,
            sources,
            sessions,
            bridges,
        }
    }

    /// Run the accept loop indefinitely
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!(addr = %self.config.bind_addr, "signaling listener started");

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        server.handle_connection(stream, peer_addr).await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "failed to accept signaling connection");
                }
            }
        }
    }

    /// Run the accept loop until `shutdown` resolves
    pub async fn run_until<F>(self: Arc<Self>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                info!("signaling listener stopping");
                Ok(())
            }
            result = Arc::clone(&self).run() => result,
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let ws = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                debug!(peer = %peer_addr, error = %e, "websocket handshake failed");
                return;
            }
        };
        info!(peer = %peer_addr, "viewer connected");
        let (mut tx, mut rx) = ws.split();

        let mut session: Option<Arc<PeerSession>> = None;
        // Candidates arriving before the offer are parked until a session
        // exists, consistent with the in-session buffering policy
        let mut early_candidates: Vec<CandidateInfo> = Vec::new();

        while let Some(message) = rx.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!(peer = %peer_addr, error = %e, "websocket read failed");
                    break;
                }
            };

            let parsed = match serde_json::from_str::<SignalMessage>(&text) {
                Ok(parsed) => parsed,
                Err(e) => {
                    // Malformed message: drop it, keep the connection
                    warn!(peer = %peer_addr, error = %e, "invalid signaling message");
                    continue;
                }
            };

            match parsed {
                SignalMessage::Offer(offer) => {
                    if session.is_some() {
                        warn!(peer = %peer_addr, "second offer on one connection, closing");
                        break;
                    }
                    match self.handshake(&offer).await {
                        Ok((new_session, answer_sdp)) => {
                            for candidate in early_candidates.drain(..) {
                                if let Err(e) = new_session.add_ice_candidate(&candidate).await {
                                    debug!(session_id = %new_session.id, error = %e, "early candidate rejected");
                                }
                            }

                            let answer =
                                SignalMessage::Answer(SessionAnswer { sdp: answer_sdp });
                            let payload = match serde_json::to_string(&answer) {
                                Ok(payload) => payload,
                                Err(e) => {
                                    warn!(session_id = %new_session.id, error = %e, "answer serialization failed");
                                    session = Some(new_session);
                                    break;
                                }
                            };
                            if tx.send(Message::Text(payload)).await.is_err() {
                                session = Some(new_session);
                                break;
                            }
                            session = Some(new_session);
                        }
                        Err(e) => {
                            // A failed handshake closes without an answer
                            warn!(peer = %peer_addr, source_id = %offer.source_id, error = %e, "handshake failed");
                            break;
                        }
                    }
                }
                SignalMessage::IceCandidate(candidate) => match &session {
                    Some(session) => {
                        if let Err(e) = session.add_ice_candidate(&candidate).await {
                            debug!(session_id = %session.id, error = %e, "candidate rejected");
                        }
                    }
                    None => early_candidates.push(candidate),
                },
                SignalMessage::Frame(inject) => {
                    if let Err(e) = self
                        .sources
                        .inject_frame(&inject.source_id, inject.frame_data)
                        .await
                    {
                        debug!(source_id = %inject.source_id, error = %e, "frame injection rejected");
                    }
                }
                SignalMessage::Answer(_) => {
                    debug!(peer = %peer_addr, "unexpected answer from viewer, ignoring");
                }
            }
        }

        if let Some(session) = session {
            self.sessions.mark_closed(&session.id).await;
        }
        info!(peer = %peer_addr, "viewer disconnected");
    }

    /// Drive one offer/answer handshake
    ///
    /// The source is resolved first, so an unknown id fails before any
    /// transport state exists and nothing is ever half-registered.
    pub(crate) async fn handshake(
        &self,
        offer: &SessionOffer,
    ) -> Result<(Arc<PeerSession>, String)> {
        let buffer = self.sources.buffer(&offer.source_id).await?;
        let bridge = self.bridges.get_or_create(&offer.source_id, buffer);

        let session_id = Uuid::new_v4().to_string();
        let session = Arc::new(
            PeerSession::new(&self.webrtc, session_id, offer.source_id.clone(), bridge).await?,
        );

        let answer_sdp = match session.handle_offer(offer.sdp.clone()).await {
            Ok(answer_sdp) => answer_sdp,
            Err(e) => {
                session.close().await;
                return Err(e);
            }
        };

        if let Err(e) = self.sessions.register(Arc::clone(&session)).await {
            session.close().await;
            return Err(e);
        }

        spawn_close_watcher(Arc::clone(&self.sessions), &session);
        Ok((session, answer_sdp))
    }
}

/// Deregister the session once the transport reaches its terminal state
fn spawn_close_watcher(registry: Arc<SessionRegistry>, session: &Arc<PeerSession>) {
    let mut state_rx = session.state_watch();
    let session_id = session.id.clone();
    tokio::spawn(async move {
        loop {
            if state_rx.borrow().is_terminal() {
                break;
            }
            if state_rx.changed().await.is_err() {
                break;
            }
        }
        registry.mark_closed(&session_id).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::error::RelayError;
    use crate::events::EventBus;
    use crate::vehicle::{VehicleLink, VehicleStatus, Velocity, VideoFeed};
    use crate::video::RawFrame;
    use async_trait::async_trait;
    use bytes::Bytes;

    struct StubFeed;

    #[async_trait]
    impl VideoFeed for StubFeed {
        async fn next_frame(&mut self) -> Result<Option<RawFrame>> {
            Ok(RawFrame::new(Bytes::from(vec![0u8; 4 * 4 * 3]), 4, 4))
        }
    }

    struct StubLink;

    #[async_trait]
    impl VehicleLink for StubLink {
        async fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        async fn status(&self) -> Result<VehicleStatus> {
            Ok(VehicleStatus {
                battery: 50,
                temperature: 30.0,
                height: 0,
                velocity: Velocity::default(),
                flight_time: 0,
                signal_quality: None,
            })
        }

        async fn stream_on(&mut self) -> Result<Box<dyn VideoFeed>> {
            Ok(Box::new(StubFeed))
        }

        async fn stream_off(&mut self) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn server_over(sources: Arc<SourceManager>) -> SignalingServer {
        SignalingServer::new(
            SignalingConfig::default(),
            WebRtcConfig::default(),
            sources,
            Arc::new(SessionRegistry::new(0)),
            Arc::new(BridgeRegistry::new(WebRtcConfig::default())),
        )
    }

    #[tokio::test]
    async fn test_offer_for_unknown_source_registers_nothing() {
        let sources = Arc::new(SourceManager::new(IngestConfig::default(), EventBus::new()));
        let server = server_over(sources);

        let offer = SessionOffer {
            sdp: "v=0".to_string(),
            source_id: "ghost".to_string(),
        };
        let result = server.handshake(&offer).await;

        assert!(matches!(result, Err(RelayError::SourceNotFound(_))));
        assert_eq!(server.sessions.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_bad_offer_for_known_source_registers_nothing() {
        let sources = Arc::new(SourceManager::new(IngestConfig::default(), EventBus::new()));
        sources
            .connect_source("drone-1", Box::new(StubLink))
            .await
            .unwrap();
        let server = server_over(sources);

        let offer = SessionOffer {
            sdp: "this is not sdp".to_string(),
            source_id: "drone-1".to_string(),
        };
        let result = server.handshake(&offer).await;

        assert!(result.is_err());
        assert_eq!(server.sessions.session_count().await, 0);
        // The transient session released its bridge reference on failure
        assert_eq!(server.bridges.live_count(), 0);
    }
}
