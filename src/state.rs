//! Shared relay state
//!
//! Aggregates the source table, session registry, bridge registry, and
//! event bus. The embedding application holds one [`RelayState`], wires
//! its HTTP layer to the control methods on [`SourceManager`], and runs
//! the signaling server.

use std::sync::Arc;

use tracing::info;

use crate::config::RelayConfig;
use crate::events::EventBus;
use crate::ingest::SourceManager;
use crate::webrtc::{BridgeRegistry, SessionRegistry, SignalingServer};

/// Top-level handle over all relay components
pub struct RelayState {
    pub config: RelayConfig,
    pub events: EventBus,
    pub sources: Arc<SourceManager>,
    pub sessions: Arc<SessionRegistry>,
    pub bridges: Arc<BridgeRegistry>,
}

impl RelayState {
    /// Build relay state from configuration
    pub fn new(config: RelayConfig) -> Self {
        let events = EventBus::new();
        let sources = Arc::new(SourceManager::new(config.ingest.clone(), events.clone()));
        let sessions = Arc::new(SessionRegistry::new(config.signaling.max_sessions));
        let bridges = Arc::new(BridgeRegistry::new(config.webrtc.clone()));

        Self {
            config,
            events,
            sources,
            sessions,
            bridges,
        }
    }

    /// Build the signaling server bound to this state
    pub fn signaling_server(&self) -> Arc<SignalingServer> {
        Arc::new(SignalingServer::new(
            self.config.signaling.clone(),
            self.config.webrtc.clone(),
            Arc::clone(&self.sources),
            Arc::clone(&self.sessions),
            Arc::clone(&self.bridges),
        ))
    }

    /// Stop every stream, close every session, release every vehicle
    pub async fn shutdown(&self) {
        info!("relay shutting down");
        self.sessions.close_all().await;
        self.sources.disconnect_all().await;
        info!("relay shutdown complete");
    }
}
