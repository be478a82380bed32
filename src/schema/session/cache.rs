//! Version-keyed session info cache

use std::sync::Arc;

use super::SessionInfo;

/// Parsed session info remembered together with the version it came from.
///
/// `session_info` is None when the provider had no YAML for that version or
/// the YAML could not be parsed; the miss is cached too so a broken document
/// is not re-parsed on every poll.
#[derive(Debug, Clone)]
pub struct SessionInfoCache {
    /// Cached session info
    pub session_info: Option<Arc<SessionInfo>>,
    /// Version counter when this was cached
    pub version: u32,
}

impl SessionInfoCache {
    /// Create new cache entry
    pub fn new(session_info: Option<SessionInfo>, version: u32) -> Self {
        Self { session_info: session_info.map(Arc::new), version }
    }

    /// Check if cache is valid for given version
    pub fn is_valid(&self, current_version: u32) -> bool {
        self.version == current_version
    }
}
