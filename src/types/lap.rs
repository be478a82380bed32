//! Messages sent to the collector

use serde::{Deserialize, Serialize};

/// Event name for the per-connection registration message.
pub const REGISTER_EVENT: &str = "register-agent";

/// Event name for a completed lap.
pub const LAP_EVENT: &str = "telemetry-data";

/// A completed lap, derived once per detected lap boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapEvent {
    /// Lap time in seconds, rounded to milliseconds (always > 0)
    pub lap_time: f64,
    /// The lap counter value that marked the boundary
    pub lap_number: i32,
    pub track_name: String,
    pub car_name: String,
    /// Mirrors the on-track flag at detection time
    pub is_valid: bool,
}

/// Identity announced to the collector on every (re)connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgent {
    pub driver_name: String,
    pub computer_name: String,
}

/// Round a lap time to millisecond precision.
///
/// Returns None when the input is not a recorded time, including values
/// that round down to zero.
pub fn round_lap_time(seconds: f64) -> Option<f64> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    let rounded = (seconds * 1000.0).round() / 1000.0;
    (rounded > 0.0).then_some(rounded)
}
