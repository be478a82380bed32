//! Simulator session metadata
//!
//! Scalar channels arrive in every frame; everything else the relay needs
//! (track and car names) lives in the simulator's session-info YAML, which is
//! republished only when the session changes.

pub mod session;

pub use session::{SessionInfo, SessionInfoCache};
