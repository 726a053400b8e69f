//! WebRTC transport and signaling
//!
//! One viewer, one WebSocket connection, one peer session:
//!
//! ```text
//! FrameBuffer (per source)
//!      |
//!      v
//! TrackBridge (shared per source) --- pull per pacing period
//!      |
//!      v
//! TrackLocalStaticSample (per session)
//!      |
//!      v
//! RTCPeerConnection  <---- offer/answer/candidates ----  viewer
//! ```

pub mod peer;
pub mod server;
pub mod session;
pub mod signaling;
pub mod track;

pub use peer::PeerSession;
pub use server::SignalingServer;
pub use session::SessionRegistry;
pub use signaling::{
    CandidateInfo, FrameInject, SessionAnswer, SessionOffer, SessionState, SignalMessage,
};
pub use track::{BridgeRegistry, BridgeStats, TrackBridge};
