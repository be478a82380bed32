//! Polling supervisor
//!
//! Top-level control loop. Connects to the collector once, then alternates
//! between probing for the simulator and polling it while a session is live.
//! It is the only place errors are recovered: anything a cycle returns is
//! logged and followed by a backoff sleep, after which polling resumes.
//!
//! ```text
//! connect ──fail──► Err(Connection)
//!    │
//!    ▼
//! ┌─► probe ──not running──► sleep(probe) ─┐
//! │     │                                  │
//! │     ▼ running                          │
//! │   every poll tick: read → detect → send│
//! │     │ session ended                    │
//! │     ▼                                  │
//! │   reset detector, sleep(probe) ────────┤
//! │                                        │
//! └────────────────────────────────────────┘
//!        any error: sleep(backoff), resume
//! ```

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::collector::{CollectorChannel, ConnectionManager};
use crate::detector::LapDetector;
use crate::provider::TelemetryProvider;
use crate::source::TelemetrySource;
use crate::{RelayError, Result};

/// Sleep durations used by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollCadence {
    /// Between reads while a session is live
    pub poll_interval: Duration,
    /// Between probes while the simulator is absent
    pub probe_interval: Duration,
    /// After an unexpected error
    pub error_backoff: Duration,
}

impl Default for PollCadence {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            probe_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
        }
    }
}

impl PollCadence {
    /// Whether poll < probe < backoff holds.
    pub fn is_ordered(&self) -> bool {
        self.poll_interval < self.probe_interval && self.probe_interval < self.error_backoff
    }
}

/// Counters reported when the supervisor stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Complete snapshots read from the simulator
    pub frames_read: u64,
    pub laps_detected: u64,
    pub laps_sent: u64,
    /// Laps detected while the collector was unreachable
    pub laps_dropped: u64,
    /// Cycles that ended in an error and a backoff
    pub loop_errors: u64,
}

/// Drives source, detector and connection until cancelled
pub struct Supervisor<P, C> {
    source: TelemetrySource<P>,
    detector: LapDetector,
    connection: ConnectionManager<C>,
    server_url: String,
    cadence: PollCadence,
    stats: RelayStats,
}

impl<P, C> Supervisor<P, C>
where
    P: TelemetryProvider,
    C: CollectorChannel,
{
    pub fn new(
        provider: P,
        connection: ConnectionManager<C>,
        server_url: impl Into<String>,
        cadence: PollCadence,
    ) -> Self {
        if !cadence.is_ordered() {
            warn!(?cadence, "Poll cadence should satisfy poll < probe < backoff");
        }
        Self {
            source: TelemetrySource::new(provider),
            detector: LapDetector::new(),
            connection,
            server_url: server_url.into(),
            cadence,
            stats: RelayStats::default(),
        }
    }

    /// Run until `cancel` fires.
    ///
    /// Fails only when the initial collector connection cannot be made; in
    /// that case the simulator is never probed.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<RelayStats> {
        let connected = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.connection.connect(&self.server_url) => Some(result),
        };

        match connected {
            None => info!("Cancelled before the collector connection was made"),
            Some(Err(e)) => {
                error!(url = %self.server_url, error = %e, "Could not connect to collector");
                self.source.shutdown();
                if let Err(e) = self.connection.shutdown().await {
                    debug!(error = %e, "Connection shutdown after failed connect");
                }
                return Err(RelayError::Connection {
                    reason: format!("initial connection to {} failed", self.server_url),
                    source: Some(Box::new(e)),
                });
            }
            Some(Ok(())) => {
                info!("Waiting for the simulator");
                self.poll_until_cancelled(&cancel).await;
            }
        }

        info!("Shutting down");
        if let Err(e) = self.connection.shutdown().await {
            warn!(error = %e, "Collector disconnect failed");
        }
        self.source.shutdown();
        Ok(self.stats)
    }

    async fn poll_until_cancelled(&mut self, cancel: &CancellationToken) {
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = self.cycle() => result,
            };

            if let Err(e) = result {
                self.stats.loop_errors += 1;
                error!(
                    error = %e,
                    retryable = e.is_retryable(),
                    backoff = ?self.cadence.error_backoff,
                    "Relay loop error"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(self.cadence.error_backoff) => {}
                }
            }
        }
    }

    /// One probe, plus a full polling session when the simulator is up.
    async fn cycle(&mut self) -> Result<()> {
        if !self.source.probe().await? {
            trace!("Simulator not running");
            tokio::time::sleep(self.cadence.probe_interval).await;
            return Ok(());
        }

        info!("Simulator connected, polling telemetry");
        let mut ticker = tokio::time::interval(self.cadence.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut polled = Ok(());
        while self.source.is_connected() {
            ticker.tick().await;
            if let Err(e) = self.poll_once().await {
                polled = Err(e);
                break;
            }
        }

        // A read can fail on the same call that ends the session.
        if !self.source.is_connected() {
            info!(last_lap = self.detector.last_lap_number(), "Simulator disconnected");
            self.detector.reset();
            self.source.end_session();
        }
        polled?;

        tokio::time::sleep(self.cadence.probe_interval).await;
        Ok(())
    }

    async fn poll_once(&mut self) -> Result<()> {
        let Some(snapshot) = self.source.read_frame().await? else {
            return Ok(());
        };
        self.stats.frames_read += 1;

        let Some(lap) = self.detector.observe(&snapshot) else {
            return Ok(());
        };
        self.stats.laps_detected += 1;
        info!(
            lap = lap.lap_number,
            lap_time = lap.lap_time,
            track = %lap.track_name,
            car = %lap.car_name,
            "Lap completed"
        );

        if self.connection.send(&lap)? {
            self.stats.laps_sent += 1;
        } else {
            self.stats.laps_dropped += 1;
        }
        Ok(())
    }
}
