//! Lap event detection
//!
//! The detector is a two-state machine over the last lap number it saw:
//!
//! ```text
//!            first valid snapshot (no event)
//! NoSession ───────────────────────────────► Tracking(L)
//!     ▲                                          │  lap > L, time > 0 → LapEvent
//!     │ reset() on simulator disconnect          │  lap > L, time <= 0 → advance only
//!     └──────────────────────────────────────────┤  lap == L → nothing
//!                                                │  lap < L → new baseline
//! ```
//!
//! Only the supervisor resets the detector; the detector never infers a
//! session end from the data it sees.

use tracing::{debug, trace};

use crate::types::{LapEvent, TelemetrySnapshot, round_lap_time};

/// Observable state of the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// No lap number recorded since startup or the last reset
    NoSession,
    /// Tracking laps; holds the last lap number seen
    Tracking(i32),
}

/// Detects lap boundaries in a sequence of snapshots.
#[derive(Debug, Clone)]
pub struct LapDetector {
    /// -1 while in [`DetectorState::NoSession`]
    last_lap_number: i32,
}

impl Default for LapDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl LapDetector {
    pub fn new() -> Self {
        Self { last_lap_number: -1 }
    }

    pub fn state(&self) -> DetectorState {
        if self.last_lap_number < 0 {
            DetectorState::NoSession
        } else {
            DetectorState::Tracking(self.last_lap_number)
        }
    }

    pub fn last_lap_number(&self) -> i32 {
        self.last_lap_number
    }

    /// Feed one snapshot; returns the completed lap if a boundary was crossed.
    pub fn observe(&mut self, snapshot: &TelemetrySnapshot) -> Option<LapEvent> {
        if !snapshot.has_lap_number() {
            trace!("Lap number unknown, ignoring snapshot");
            return None;
        }
        let lap = snapshot.lap_number;

        let previous = self.last_lap_number;
        self.last_lap_number = lap;

        if previous < 0 {
            debug!(lap, "Tracking laps");
            return None;
        }

        if lap < previous {
            debug!(previous, lap, "Lap counter went backwards, new baseline");
            return None;
        }

        if lap == previous {
            return None;
        }

        let lap_time = snapshot
            .has_lap_time()
            .then(|| round_lap_time(snapshot.last_lap_time))
            .flatten();
        match lap_time {
            Some(lap_time) => Some(LapEvent {
                lap_time,
                lap_number: lap,
                track_name: snapshot.track_name.clone(),
                car_name: snapshot.car_name.clone(),
                is_valid: snapshot.is_on_track,
            }),
            None => {
                debug!(
                    lap,
                    last_lap_time = snapshot.last_lap_time,
                    "Lap boundary without a recorded time"
                );
                None
            }
        }
    }

    /// Return to [`DetectorState::NoSession`].
    pub fn reset(&mut self) {
        if self.last_lap_number >= 0 {
            debug!(last_lap = self.last_lap_number, "Lap tracking reset");
        }
        self.last_lap_number = -1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::snapshot;
    use proptest::prelude::*;

    fn tracking_at(lap: i32) -> LapDetector {
        let mut detector = LapDetector::new();
        assert!(detector.observe(&snapshot(lap, 0.0)).is_none());
        detector
    }

    #[test]
    fn starts_without_session() {
        let detector = LapDetector::new();
        assert_eq!(detector.state(), DetectorState::NoSession);
        assert_eq!(detector.last_lap_number(), -1);
    }

    #[test]
    fn three_laps_emit_two_events() {
        let mut detector = LapDetector::new();
        let events: Vec<LapEvent> = [snapshot(0, 0.0), snapshot(1, 90.123), snapshot(2, 88.456)]
            .iter()
            .filter_map(|s| detector.observe(s))
            .collect();

        assert_eq!(events.len(), 2);
        assert_eq!((events[0].lap_number, events[0].lap_time), (1, 90.123));
        assert_eq!((events[1].lap_number, events[1].lap_time), (2, 88.456));
        assert_eq!(events[0].track_name, "Summit Point Raceway");
        assert_eq!(events[0].car_name, "Mazda MX-5 Cup");
    }

    #[test]
    fn repeated_lap_is_silent() {
        let mut detector = tracking_at(4);
        for _ in 0..10 {
            assert!(detector.observe(&snapshot(4, 95.0)).is_none());
        }
        assert_eq!(detector.state(), DetectorState::Tracking(4));
    }

    #[test]
    fn unrecorded_time_advances_without_event() {
        let mut detector = tracking_at(1);
        assert!(detector.observe(&snapshot(2, 0.0)).is_none());
        assert_eq!(detector.state(), DetectorState::Tracking(2));
        assert!(detector.observe(&snapshot(2, 0.0)).is_none());
        assert!(detector.observe(&snapshot(2, -1.0)).is_none());
        assert!(detector.observe(&snapshot(3, f64::NAN)).is_none());
        assert_eq!(detector.state(), DetectorState::Tracking(3));

        let event = detector.observe(&snapshot(4, 77.7)).expect("next valid lap");
        assert_eq!(event.lap_number, 4);
    }

    #[test]
    fn reset_then_restart_at_lap_zero_is_silent() {
        let mut detector = tracking_at(0);
        for lap in 1..=3 {
            assert!(detector.observe(&snapshot(lap, 60.0)).is_some());
        }

        detector.reset();
        assert_eq!(detector.state(), DetectorState::NoSession);

        assert!(detector.observe(&snapshot(0, 61.5)).is_none());
        assert_eq!(detector.state(), DetectorState::Tracking(0));
    }

    #[test]
    fn backwards_lap_counter_becomes_baseline() {
        let mut detector = tracking_at(7);
        assert!(detector.observe(&snapshot(1, 99.0)).is_none());
        assert_eq!(detector.state(), DetectorState::Tracking(1));

        let event = detector.observe(&snapshot(2, 64.0)).expect("progress from new baseline");
        assert_eq!(event.lap_number, 2);
    }

    #[test]
    fn unknown_lap_number_leaves_state_alone() {
        let mut detector = tracking_at(5);
        assert!(detector.observe(&snapshot(-1, 70.0)).is_none());
        assert_eq!(detector.state(), DetectorState::Tracking(5));

        let mut fresh = LapDetector::new();
        assert!(fresh.observe(&snapshot(-1, 70.0)).is_none());
        assert_eq!(fresh.state(), DetectorState::NoSession);
    }

    #[test]
    fn validity_mirrors_on_track_flag() {
        let mut detector = tracking_at(0);
        let mut off_track = snapshot(1, 80.0);
        off_track.is_on_track = false;
        let event = detector.observe(&off_track).unwrap();
        assert!(!event.is_valid);
    }

    #[test]
    fn skipped_laps_emit_single_event() {
        let mut detector = tracking_at(2);
        let event = detector.observe(&snapshot(5, 70.0)).expect("jump forward");
        assert_eq!(event.lap_number, 5);
        assert_eq!(detector.state(), DetectorState::Tracking(5));
    }

    proptest! {
        #[test]
        fn same_lap_never_emits(lap in 0i32..10_000, time in -10.0f64..500.0) {
            let mut detector = tracking_at(lap);
            prop_assert!(detector.observe(&snapshot(lap, time)).is_none());
            prop_assert_eq!(detector.state(), DetectorState::Tracking(lap));
        }

        #[test]
        fn next_lap_with_time_emits_once_rounded(lap in 0i32..10_000, time in 0.001f64..1_000.0) {
            let mut detector = tracking_at(lap);
            let event = detector.observe(&snapshot(lap + 1, time));
            prop_assert!(event.is_some());
            let event = event.unwrap();
            prop_assert_eq!(event.lap_number, lap + 1);
            prop_assert!(event.lap_time > 0.0);
            prop_assert!((event.lap_time - time).abs() <= 0.0005 + 1e-9);
            prop_assert_eq!(event.lap_time, (event.lap_time * 1000.0).round() / 1000.0);
            prop_assert!(detector.observe(&snapshot(lap + 1, time)).is_none());
        }

        #[test]
        fn first_snapshot_after_reset_never_emits(lap in 0i32..10_000, time in -10.0f64..500.0) {
            let mut detector = tracking_at(3);
            detector.reset();
            prop_assert!(detector.observe(&snapshot(lap, time)).is_none());
            prop_assert_eq!(detector.state(), DetectorState::Tracking(lap));
        }

        #[test]
        fn nonpositive_time_never_emits(lap in 0i32..10_000, step in 1i32..5, time in -100.0f64..=0.0) {
            let mut detector = tracking_at(lap);
            prop_assert!(detector.observe(&snapshot(lap + step, time)).is_none());
            prop_assert_eq!(detector.last_lap_number(), lap + step);
        }

        #[test]
        fn lap_number_only_advances_or_rebaselines(laps in prop::collection::vec(-1i32..50, 1..60)) {
            let mut detector = LapDetector::new();
            for lap in laps {
                let before = detector.last_lap_number();
                let event = detector.observe(&snapshot(lap, 75.0));
                if let Some(event) = event {
                    prop_assert!(before >= 0);
                    prop_assert!(event.lap_number > before);
                }
                if lap >= 0 {
                    prop_assert_eq!(detector.last_lap_number(), lap);
                } else {
                    prop_assert_eq!(detector.last_lap_number(), before);
                }
            }
        }
    }
}
