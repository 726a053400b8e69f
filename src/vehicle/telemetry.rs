//! Vehicle telemetry types

use serde::{Deserialize, Serialize};

/// Velocity vector in cm/s
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Telemetry snapshot for one vehicle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleStatus {
    /// Battery level in percent
    pub battery: u8,
    /// Board temperature in degrees Celsius
    pub temperature: f32,
    /// Height above takeoff point in centimeters
    pub height: i32,
    /// Current velocity vector
    pub velocity: Velocity,
    /// Accumulated flight time in seconds
    pub flight_time: u32,
    /// Radio signal quality; not all firmwares report it
    pub signal_quality: Option<u8>,
}
