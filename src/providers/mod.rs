//! Concrete telemetry providers

pub mod replay;

pub use replay::{ReplayProvider, ReplayScript, ScriptedSession};
