//! skyrelay - Multi-source aerial vehicle video relay
//!
//! This crate relays live video frames from remote aerial vehicles to
//! browser clients over WebRTC. Frames are pulled from each vehicle's feed
//! at a fixed cadence, JPEG-encoded into a bounded latest-frames buffer,
//! and bridged into every viewer session negotiated over a WebSocket
//! signaling channel.
//!
//! The vehicle SDK, HTTP routing, and process bootstrapping are external
//! collaborators: vehicles plug in through the [`vehicle::VehicleLink`]
//! seam and the control surface is exposed as methods on
//! [`state::RelayState`].

pub mod config;
pub mod error;
pub mod events;
pub mod ingest;
pub mod state;
pub mod util;
pub mod vehicle;
pub mod video;
pub mod webrtc;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use state::RelayState;
