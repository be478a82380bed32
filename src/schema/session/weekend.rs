//! Weekend and track information

use serde::{Deserialize, Serialize};

/// Weekend and track information from the session YAML
///
/// Only the track naming is kept; the simulator publishes many more keys,
/// which are ignored on parse.
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
#[serde(default)]
pub struct WeekendInfo {
    /// Internal track name
    pub track_name: String,
    /// Track display name
    pub track_display_name: String,
}

impl WeekendInfo {
    /// Name shown to people: display name, falling back to the internal name.
    pub fn display_name(&self) -> Option<&str> {
        [self.track_display_name.as_str(), self.track_name.as_str()]
            .into_iter()
            .find(|name| !name.trim().is_empty())
    }
}
