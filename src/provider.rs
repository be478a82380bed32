//! Provider trait for simulator data sources

use crate::Result;
use crate::types::TelemetryFrame;

/// Trait for simulator telemetry sources
///
/// A provider wraps whatever actually talks to the simulator (shared memory,
/// a recorded script, a network bridge). It knows nothing about laps or the
/// collector; it only answers "is the sim there" and "what are the channels
/// right now".
#[async_trait::async_trait]
pub trait TelemetryProvider: Send + 'static {
    /// Probe for the simulator and attach to it if it is running.
    ///
    /// Returns:
    /// - `Ok(true)` - Simulator running and a session is attached
    /// - `Ok(false)` - Simulator not available yet
    /// - `Err(e)` - Probe itself failed
    async fn startup(&mut self) -> Result<bool>;

    /// Whether the attached simulator session is still live.
    fn is_connected(&self) -> bool;

    /// Read the current telemetry channels
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - Channels read
    /// - `Ok(None)` - No data this cycle
    /// - `Err(e)` - Provider fault
    async fn next_frame(&mut self) -> Result<Option<TelemetryFrame>>;

    /// Get cleaned session YAML for a specific version
    ///
    /// Called when a frame carries a session version the caller has not seen.
    ///
    /// Returns:
    /// - `Ok(Some(yaml))` - Cleaned YAML string ready for parsing
    /// - `Ok(None)` - No session data for this version
    /// - `Err(e)` - Error extracting/cleaning session YAML
    async fn session_yaml(&mut self, version: u32) -> Result<Option<String>>;

    /// Release the simulator handle.
    fn shutdown(&mut self);
}
