//! Replay provider for scripted sessions
//!
//! A replay script is a YAML document listing one or more simulator sessions.
//! Each session carries the raw session-info YAML the simulator would publish
//! and the frames it would produce, one per poll:
//!
//! ```yaml
//! sessions:
//!   - session_info: |
//!       WeekendInfo:
//!        TrackDisplayName: Summit Point Raceway
//!       DriverInfo:
//!        DriverCarIdx: 0
//!        Drivers:
//!        - CarIdx: 0
//!          CarScreenName: Mazda MX-5 Cup
//!     frames:
//!       - { Lap: 0, LapLastLapTime: -1.0, IsOnTrack: true, LapDistPct: 0.9 }
//!       - ~   # no data this cycle
//!       - { Lap: 1, LapLastLapTime: 90.123, IsOnTrack: true, LapDistPct: 0.01 }
//! ```
//!
//! The provider reports itself connected while a session is playing. When a
//! session's frames run out the session ends, exactly like the simulator
//! closing, and the next `startup()` attaches the following session.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, trace};

use crate::provider::TelemetryProvider;
use crate::types::{TelemetryFrame, Value};
use crate::yaml_utils;
use crate::{RelayError, Result};

/// Parsed replay script
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub sessions: Vec<ScriptedSession>,
}

/// One simulator session inside a replay script
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptedSession {
    /// Raw session-info YAML, as the simulator would publish it
    #[serde(default)]
    pub session_info: Option<String>,
    /// Frames in poll order; `None` entries are cycles without data
    #[serde(default)]
    pub frames: Vec<Option<HashMap<String, Value>>>,
}

impl ReplayScript {
    /// Parse a script from YAML text
    pub fn parse(yaml: &str) -> Result<Self> {
        serde_yaml_ng::from_str(yaml)
            .map_err(|e| RelayError::parse("Replay script", e.to_string()))
    }
}

/// Provider that plays back a [`ReplayScript`]
pub struct ReplayProvider {
    script: ReplayScript,

    /// Start over after the last session instead of going quiet
    looping: bool,

    /// Index of the session the next `startup()` attaches
    next_session: usize,

    /// Session currently playing
    active: Option<usize>,

    /// Next frame within the active session
    cursor: usize,

    tick: u32,
}

impl ReplayProvider {
    /// Create a provider from an already parsed script
    pub fn new(script: ReplayScript) -> Self {
        Self { script, looping: false, next_session: 0, active: None, cursor: 0, tick: 0 }
    }

    /// Load a replay script from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| RelayError::file_error(path.to_path_buf(), e))?;
        let script = ReplayScript::parse(&yaml)?;

        let frames: usize = script.sessions.iter().map(|s| s.frames.len()).sum();
        info!(
            path = %path.display(),
            sessions = script.sessions.len(),
            frames,
            "Loaded replay script"
        );

        Ok(Self::new(script))
    }

    /// Parse a replay script from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        ReplayScript::parse(yaml).map(Self::new)
    }

    /// Restart from the first session once all sessions have played
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Number of sessions in the script
    pub fn session_count(&self) -> usize {
        self.script.sessions.len()
    }

    fn version_of(index: usize) -> u32 {
        u32::try_from(index.saturating_add(1)).unwrap_or(u32::MAX)
    }
}

#[async_trait::async_trait]
impl TelemetryProvider for ReplayProvider {
    async fn startup(&mut self) -> Result<bool> {
        if self.active.is_some() {
            return Ok(true);
        }

        if self.next_session >= self.script.sessions.len() {
            if !self.looping || self.script.sessions.is_empty() {
                return Ok(false);
            }
            debug!("Replay wrapped around to the first session");
            self.next_session = 0;
        }

        let index = self.next_session;
        self.next_session += 1;
        self.active = Some(index);
        self.cursor = 0;

        let frames = self.script.sessions.get(index).map_or(0, |s| s.frames.len());
        info!(session = index, frames, "Replay session started");
        Ok(true)
    }

    fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    async fn next_frame(&mut self) -> Result<Option<TelemetryFrame>> {
        let Some(index) = self.active else {
            return Ok(None);
        };
        let Some(session) = self.script.sessions.get(index) else {
            self.active = None;
            return Ok(None);
        };

        let frame = session.frames.get(self.cursor).cloned().flatten();
        self.cursor += 1;
        self.tick = self.tick.wrapping_add(1);

        if self.cursor >= session.frames.len() {
            debug!(session = index, "Replay session finished");
            self.active = None;
        }

        trace!(session = index, tick = self.tick, has_data = frame.is_some(), "Replay frame");
        Ok(frame.map(|vars| TelemetryFrame::new(vars, self.tick, Self::version_of(index))))
    }

    async fn session_yaml(&mut self, version: u32) -> Result<Option<String>> {
        let Some(index) = (version as usize).checked_sub(1) else {
            return Ok(None);
        };
        match self.script.sessions.get(index).and_then(|s| s.session_info.as_deref()) {
            Some(raw) => yaml_utils::preprocess_session_yaml(raw).map(Some),
            None => Ok(None),
        }
    }

    fn shutdown(&mut self) {
        if self.active.take().is_some() {
            debug!("Replay stopped mid-session");
        }
    }
}
