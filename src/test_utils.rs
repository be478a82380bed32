//! Test helpers: snapshot and frame builders, replay scripts, a recording channel
//!
//! Shared by unit tests and the `benchmark` feature.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::collector::{ChannelEvent, ChannelEvents, CollectorChannel};
use crate::providers::{ReplayScript, ScriptedSession};
use crate::types::{LapEvent, TelemetrySnapshot, Value};
use crate::{RelayError, Result};

pub const TRACK: &str = "Summit Point Raceway";
pub const CAR: &str = "Mazda MX-5 Cup";

/// Session info matching [`TRACK`] and [`CAR`] for car index 0.
pub const SESSION_INFO: &str = "\
WeekendInfo:
 TrackName: summit point
 TrackDisplayName: Summit Point Raceway
DriverInfo:
 DriverCarIdx: 0
 Drivers:
 - CarIdx: 0
   UserName: Alex Driver
   CarScreenName: Mazda MX-5 Cup
";

/// An on-track snapshot at the given lap with the given last-lap time.
pub fn snapshot(lap: i32, last_lap_time: f64) -> TelemetrySnapshot {
    TelemetrySnapshot {
        lap_number: lap,
        last_lap_time,
        track_name: TRACK.to_string(),
        car_name: CAR.to_string(),
        is_on_track: true,
        lap_dist_pct: 0.02,
        speed: 48.5,
        gear: 4,
        rpm: 6400.0,
    }
}

pub fn lap_event(lap: i32, lap_time: f64) -> LapEvent {
    LapEvent {
        lap_time,
        lap_number: lap,
        track_name: TRACK.to_string(),
        car_name: CAR.to_string(),
        is_valid: true,
    }
}

/// Raw channel values for a complete frame.
pub fn frame_vars(lap: i32, last_lap_time: f64) -> HashMap<String, Value> {
    HashMap::from([
        ("Lap".to_string(), Value::Int32(lap)),
        ("LapLastLapTime".to_string(), Value::Float64(last_lap_time)),
        ("IsOnTrack".to_string(), Value::Bool(true)),
        ("LapDistPct".to_string(), Value::Float64(0.02)),
        ("Speed".to_string(), Value::Float64(48.5)),
        ("Gear".to_string(), Value::Int32(4)),
        ("RPM".to_string(), Value::Float64(6400.0)),
    ])
}

/// Builds a [`ReplayScript`] session by session.
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    sessions: Vec<ScriptedSession>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session using [`SESSION_INFO`].
    pub fn session(self, frames: &[Option<HashMap<String, Value>>]) -> Self {
        self.session_with_info(Some(SESSION_INFO), frames)
    }

    pub fn session_with_info(
        mut self,
        session_info: Option<&str>,
        frames: &[Option<HashMap<String, Value>>],
    ) -> Self {
        self.sessions.push(ScriptedSession {
            session_info: session_info.map(str::to_string),
            frames: frames.to_vec(),
        });
        self
    }

    pub fn build(self) -> ReplayScript {
        ReplayScript { sessions: self.sessions }
    }
}

#[derive(Debug, Default)]
struct MockState {
    emitted: Mutex<Vec<(String, serde_json::Value)>>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
}

/// In-memory [`CollectorChannel`] that records every emit.
///
/// Clones share state, so a test can keep a handle after moving the channel
/// into a manager.
#[derive(Debug, Clone)]
pub struct MockChannel {
    events: mpsc::UnboundedSender<ChannelEvent>,
    state: Arc<MockState>,
    mode: ConnectMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectMode {
    Succeed,
    Fail,
    /// Handshake succeeds but the link is lost before `Connected` is published
    DropAfterHandshake,
}

impl MockChannel {
    /// A channel whose `connect` succeeds.
    pub fn new() -> (Self, ChannelEvents) {
        Self::build(ConnectMode::Succeed)
    }

    /// A channel whose `connect` always fails.
    pub fn failing() -> (Self, ChannelEvents) {
        Self::build(ConnectMode::Fail)
    }

    /// A channel whose `connect` succeeds but reports the link lost at once.
    pub fn dropping() -> (Self, ChannelEvents) {
        Self::build(ConnectMode::DropAfterHandshake)
    }

    fn build(mode: ConnectMode) -> (Self, ChannelEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events, state: Arc::default(), mode }, rx)
    }

    /// Publish a lifecycle event as the transport would.
    pub fn inject(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }

    pub fn emitted(&self) -> Vec<(String, serde_json::Value)> {
        self.state.emitted.lock().unwrap().clone()
    }

    /// Payloads emitted under the given event name.
    pub fn payloads(&self, event: &str) -> Vec<serde_json::Value> {
        self.emitted().into_iter().filter(|(name, _)| name == event).map(|(_, p)| p).collect()
    }

    pub fn connect_calls(&self) -> usize {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state.disconnect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CollectorChannel for MockChannel {
    async fn connect(&self, _url: &str) -> Result<()> {
        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            ConnectMode::Succeed => self.inject(ChannelEvent::Connected),
            ConnectMode::Fail => {
                self.inject(ChannelEvent::ConnectError { detail: "connection refused".into() });
                return Err(RelayError::connection_failed("connection refused"));
            }
            ConnectMode::DropAfterHandshake => {
                self.inject(ChannelEvent::Disconnected { reason: "transport close".into() });
            }
        }
        Ok(())
    }

    fn emit(&self, event: &str, payload: serde_json::Value) -> Result<()> {
        self.state.emitted.lock().unwrap().push((event.to_string(), payload));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.inject(ChannelEvent::Disconnected { reason: "client disconnect".into() });
        Ok(())
    }
}
