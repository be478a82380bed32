//! Per-poll telemetry snapshot

use serde::Serialize;

/// Immutable view of everything the lap detector needs from one poll cycle.
///
/// Built by the source adapter only when every required field could be read;
/// a partially populated snapshot is never produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Current lap counter, -1 when the simulator does not know it
    pub lap_number: i32,
    /// Time of the last completed lap in seconds, <= 0 when there is no valid time
    pub last_lap_time: f64,
    pub track_name: String,
    pub car_name: String,
    pub is_on_track: bool,
    /// Fraction of the current lap completed (0..1)
    pub lap_dist_pct: f64,
    pub speed: f64,
    pub gear: i32,
    pub rpm: f64,
}

impl TelemetrySnapshot {
    /// Whether the simulator reported a usable lap counter.
    pub fn has_lap_number(&self) -> bool {
        self.lap_number >= 0
    }

    /// Whether the reported last-lap time is a recorded time.
    pub fn has_lap_time(&self) -> bool {
        self.last_lap_time > 0.0
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::snapshot;

    #[test]
    fn lap_counter_and_time_presence() {
        assert!(snapshot(0, 0.0).has_lap_number());
        assert!(!snapshot(-1, 61.0).has_lap_number());

        assert!(snapshot(2, 61.0).has_lap_time());
        assert!(!snapshot(2, 0.0).has_lap_time());
        assert!(!snapshot(2, -1.0).has_lap_time());
        assert!(!snapshot(2, f64::NAN).has_lap_time());
    }
}
