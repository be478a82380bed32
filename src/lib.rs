//! Lap relay agent for sim racing telemetry.
//!
//! Lapwire watches the simulator's telemetry, detects completed laps and
//! forwards each one to a lap-time collector over a persistent Socket.IO
//! connection.
//!
//! # Architecture
//!
//! ```text
//! Supervisor ──pull──► TelemetrySource ──snapshot──► LapDetector
//!     │                      │                           │
//!     │                TelemetryProvider              LapEvent
//!     │                                                  ▼
//!     └──────────────────────────────────────► ConnectionManager ──► CollectorChannel
//! ```
//!
//! - [`provider::TelemetryProvider`] is the simulator data source
//!   ([`providers::ReplayProvider`] plays back recorded sessions)
//! - [`source::TelemetrySource`] turns raw frames into complete snapshots
//! - [`detector::LapDetector`] decides when a lap boundary was crossed
//! - [`collector::ConnectionManager`] tracks connectivity and delivers laps
//! - [`supervisor::Supervisor`] runs the polling loop and recovers from errors
//!
//! ## Example
//!
//! ```rust,no_run
//! use lapwire::collector::{ConnectionManager, SocketIoChannel, TransportConfig};
//! use lapwire::providers::ReplayProvider;
//! use lapwire::supervisor::{PollCadence, Supervisor};
//! use lapwire::types::RegisterAgent;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = ReplayProvider::open("sessions/summit.yaml")?;
//!     let (channel, events) = SocketIoChannel::new(TransportConfig::default());
//!     let identity = RegisterAgent {
//!         driver_name: "Alex".into(),
//!         computer_name: "sim-rig".into(),
//!     };
//!     let connection = ConnectionManager::spawn(channel, events, identity);
//!
//!     let supervisor =
//!         Supervisor::new(provider, connection, "http://localhost:3000", PollCadence::default());
//!     let stats = supervisor.run(CancellationToken::new()).await?;
//!     println!("{} laps sent", stats.laps_sent);
//!     Ok(())
//! }
//! ```

mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;
mod yaml_utils;

pub mod collector;
pub mod config;
pub mod detector;
pub mod provider;
pub mod providers;
pub mod schema;
pub mod source;
pub mod supervisor;

pub use error::*;
pub use types::*;

pub use collector::{ConnectionManager, ConnectionState};
pub use detector::{DetectorState, LapDetector};
pub use schema::SessionInfo;
pub use supervisor::{PollCadence, RelayStats, Supervisor};
