//! Core types for telemetry and collector messages.
//!
//! ## Architecture
//!
//! - [`TelemetryFrame`] is what a provider hands over each poll: named channel
//!   values plus a session version
//! - [`Value`] and [`FromValue`] give typed access to individual channels
//! - [`TelemetrySnapshot`] is the fully-read view consumed by the lap detector
//! - [`LapEvent`] and [`RegisterAgent`] are the two messages sent to the collector
//!
//! ## Usage Example
//!
//! ```rust
//! use lapwire::types::{TelemetryFrame, Value};
//! use std::collections::HashMap;
//!
//! let mut vars = HashMap::new();
//! vars.insert("Lap".to_string(), Value::Int32(3));
//! vars.insert("LapLastLapTime".to_string(), Value::Float64(92.5));
//!
//! let frame = TelemetryFrame::new(vars, 600, 1);
//! assert_eq!(frame.i32("Lap"), Some(3));
//! assert_eq!(frame.f64("LapLastLapTime"), Some(92.5));
//! ```

mod frame;
mod lap;
mod snapshot;
mod value;

pub use frame::TelemetryFrame;
pub use lap::{LAP_EVENT, LapEvent, REGISTER_EVENT, RegisterAgent, round_lap_time};
pub use snapshot::TelemetrySnapshot;
pub use value::{FromValue, Value};
