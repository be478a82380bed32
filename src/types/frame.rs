//! Frame type handed from providers to the source adapter

use std::collections::HashMap;
use std::sync::Arc;

use super::{FromValue, Value};
use crate::{RelayError, Result};

/// One read of the simulator's scalar telemetry channels.
///
/// Channels are addressed by their SDK names (`Lap`, `LapLastLapTime`, ...).
/// The `session_version` changes whenever the simulator publishes new
/// session info, which tells the adapter to re-read it.
#[derive(Debug, Clone)]
pub struct TelemetryFrame {
    /// Channel values by name (shared, never mutated after construction)
    pub vars: Arc<HashMap<String, Value>>,

    /// Monotonic frame counter
    pub tick: u32,

    /// Session info version this frame belongs to
    pub session_version: u32,
}

impl TelemetryFrame {
    /// Create a new frame
    pub fn new(vars: HashMap<String, Value>, tick: u32, session_version: u32) -> Self {
        Self { vars: Arc::new(vars), tick, session_version }
    }

    /// Raw channel value, if present.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Typed lookup that reports why a channel could not be read.
    pub fn require<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self
            .value(name)
            .ok_or_else(|| RelayError::FieldNotFound { field: name.to_string() })?;
        T::from_value(value)
    }

    /// Typed lookup returning None on a missing channel or type mismatch.
    pub fn get<T: FromValue>(&self, name: &str) -> Option<T> {
        self.require(name).ok()
    }

    /// Convenience typed helpers
    pub fn f64(&self, name: &str) -> Option<f64> {
        self.get(name)
    }
    pub fn i32(&self, name: &str) -> Option<i32> {
        self.get(name)
    }
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name)
    }
}
