//! Telemetry source adapter
//!
//! Turns raw provider frames plus session info into [`TelemetrySnapshot`]s.
//! A snapshot is produced only when every field could be read; anything
//! missing makes the whole cycle "unavailable" so partial data never reaches
//! the lap detector.

use tracing::{debug, trace, warn};

use crate::provider::TelemetryProvider;
use crate::schema::{SessionInfo, SessionInfoCache};
use crate::types::{TelemetryFrame, TelemetrySnapshot};
use crate::{RelayError, Result};

/// Wraps a [`TelemetryProvider`] and exposes one "read current frame" operation.
pub struct TelemetrySource<P> {
    provider: P,
    session: Option<SessionInfoCache>,
}

impl<P: TelemetryProvider> TelemetrySource<P> {
    /// Create an adapter over the given provider
    pub fn new(provider: P) -> Self {
        Self { provider, session: None }
    }

    /// Probe for the simulator (see [`TelemetryProvider::startup`]).
    pub async fn probe(&mut self) -> Result<bool> {
        self.provider.startup().await
    }

    /// Whether the simulator session is still live.
    pub fn is_connected(&self) -> bool {
        self.provider.is_connected()
    }

    /// Read the current frame.
    ///
    /// Returns:
    /// - `Ok(Some(snapshot))` - All required fields were read
    /// - `Ok(None)` - Unavailable this cycle (not connected, no data, missing field)
    /// - `Err(e)` - The provider itself failed
    pub async fn read_frame(&mut self) -> Result<Option<TelemetrySnapshot>> {
        if !self.provider.is_connected() {
            trace!("Simulator not connected, no frame");
            return Ok(None);
        }

        let Some(frame) = self.provider.next_frame().await? else {
            trace!("No telemetry this cycle");
            return Ok(None);
        };

        let session = self.session_for(frame.session_version).await?;

        match build_snapshot(&frame, session.as_deref()) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                debug!(tick = frame.tick, error = %e, "Telemetry frame unavailable");
                Ok(None)
            }
        }
    }

    /// Forget cached session info; called when the simulator session ends.
    pub fn end_session(&mut self) {
        if self.session.take().is_some() {
            debug!("Dropped cached session info");
        }
    }

    /// Release the simulator handle.
    pub fn shutdown(&mut self) {
        self.end_session();
        self.provider.shutdown();
    }

    async fn session_for(&mut self, version: u32) -> Result<Option<std::sync::Arc<SessionInfo>>> {
        if let Some(cached) = &self.session {
            if cached.is_valid(version) {
                return Ok(cached.session_info.clone());
            }
        }

        debug!(version, "Session version changed, reading session info");
        let yaml = match self.provider.session_yaml(version).await {
            Ok(yaml) => yaml,
            Err(e @ RelayError::Parse { .. }) => {
                debug!(version, error = %e, "Session info could not be cleaned");
                None
            }
            Err(e) => return Err(e),
        };

        let parsed = match yaml {
            Some(yaml) => match SessionInfo::parse(&yaml) {
                Ok(session) => {
                    debug!(
                        version,
                        track = session.track_name().unwrap_or("<unknown>"),
                        driver = session.player().map_or("<unknown>", |d| d.user_name.as_str()),
                        "Session info parsed"
                    );
                    Some(session)
                }
                Err(e) => {
                    warn!(version, error = %e, "Failed to parse session info");
                    None
                }
            },
            None => {
                debug!(version, "No session info for version");
                None
            }
        };

        let entry = SessionInfoCache::new(parsed, version);
        let session = entry.session_info.clone();
        self.session = Some(entry);
        Ok(session)
    }
}

/// Assemble a snapshot from one frame and the matching session info.
///
/// Fails on the first field that cannot be read.
pub fn build_snapshot(
    frame: &TelemetryFrame,
    session: Option<&SessionInfo>,
) -> Result<TelemetrySnapshot> {
    let session = session.ok_or_else(|| RelayError::FieldNotFound {
        field: "SessionInfo".to_string(),
    })?;
    let track_name = session
        .track_name()
        .ok_or_else(|| RelayError::FieldNotFound { field: "WeekendInfo.TrackDisplayName".into() })?;
    let car_name = session.player_car_name().ok_or_else(|| RelayError::FieldNotFound {
        field: "DriverInfo.Drivers[DriverCarIdx].CarScreenName".into(),
    })?;

    Ok(TelemetrySnapshot {
        lap_number: frame.require("Lap")?,
        last_lap_time: frame.require("LapLastLapTime")?,
        track_name: track_name.to_string(),
        car_name: car_name.to_string(),
        is_on_track: frame.require("IsOnTrack")?,
        lap_dist_pct: frame.require("LapDistPct")?,
        speed: frame.require("Speed")?,
        gear: frame.require("Gear")?,
        rpm: frame.require("RPM")?,
    })
}
