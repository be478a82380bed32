//! # Session Information Parsing
//!
//! The simulator publishes session metadata as a YAML document whose version
//! counter changes whenever the content changes. The relay only needs the
//! track name and the local driver's car, but parses into typed structs so a
//! malformed document is rejected as a whole instead of yielding half a
//! snapshot.
//!
//! ```text
//! WeekendInfo:
//!  TrackDisplayName: Summit Point Raceway
//! DriverInfo:
//!  DriverCarIdx: 0
//!  Drivers:
//!  - CarIdx: 0
//!    UserName: Alex Driver
//!    CarScreenName: Mazda MX-5 Cup
//! ```

use serde::{Deserialize, Serialize};

pub mod cache;
pub mod driver;
pub mod weekend;

pub use cache::SessionInfoCache;
pub use driver::{Driver, DriverInfoData};
pub use weekend::WeekendInfo;

/// Session information parsed from the simulator's session YAML
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct SessionInfo {
    /// Weekend and track information
    #[serde(default)]
    pub weekend_info: WeekendInfo,
    /// Driver information (local driver + entry list)
    #[serde(default)]
    pub driver_info: Option<DriverInfoData>,
}

impl SessionInfo {
    /// Parse cleaned YAML into SessionInfo
    ///
    /// The YAML should already be run through
    /// [`preprocess_session_yaml`](crate::yaml_utils::preprocess_session_yaml).
    pub fn parse(yaml: &str) -> crate::Result<Self> {
        serde_yaml_ng::from_str(yaml).map_err(|e| {
            crate::RelayError::parse("SessionInfo deserialization", e.to_string())
        })
    }

    /// Track name shown to people, if the session carries one.
    pub fn track_name(&self) -> Option<&str> {
        self.weekend_info.display_name()
    }

    /// The local driver's entry in the Drivers list.
    pub fn player(&self) -> Option<&Driver> {
        self.driver_info.as_ref()?.player()
    }

    /// Screen name of the local driver's car.
    pub fn player_car_name(&self) -> Option<&str> {
        self.player()?.car_screen_name.as_deref().filter(|name| !name.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION_YAML: &str = "\
WeekendInfo:
 TrackName: summit raceway
 TrackID: 14
 TrackLength: 3.27 km
 TrackDisplayName: Summit Point Raceway
 TrackConfigName: Summit Point Raceway
 EventType: Practice
DriverInfo:
 DriverCarIdx: 2
 DriverUserID: 12345
 Drivers:
 - CarIdx: 0
   UserName: Pace Car
   CarScreenName: safety pcporsche911cup
   CarIsPaceCar: 1
 - CarIdx: 2
   UserName: Alex Driver
   UserID: 12345
   CarNumber: \"42\"
   CarScreenName: Mazda MX-5 Cup
SplitTimeInfo:
 Sectors:
 - SectorNum: 0
   SectorStartPct: 0.000000
";

    #[test]
    fn parses_track_and_player_car() {
        let session = SessionInfo::parse(SESSION_YAML).expect("session yaml should parse");

        assert_eq!(session.track_name(), Some("Summit Point Raceway"));
        let player = session.player().expect("player entry");
        assert_eq!(player.user_name, "Alex Driver");
        assert_eq!(session.player_car_name(), Some("Mazda MX-5 Cup"));
    }

    #[test]
    fn player_lookup_matches_car_idx_not_position() {
        let session = SessionInfo::parse(SESSION_YAML).expect("session yaml should parse");
        let drivers = session.driver_info.as_ref().and_then(|d| d.drivers.as_ref()).unwrap();
        // position 2 does not exist; CarIdx 2 is the second entry
        assert_eq!(drivers.len(), 2);
        assert_eq!(session.player().map(|d| d.car_idx), Some(2));
    }

    #[test]
    fn missing_player_entry_yields_none() {
        let yaml = "\
WeekendInfo:
 TrackDisplayName: Okayama
DriverInfo:
 DriverCarIdx: 7
 Drivers:
 - CarIdx: 0
   UserName: Someone Else
   CarScreenName: Skip Barber
";
        let session = SessionInfo::parse(yaml).expect("session yaml should parse");
        assert_eq!(session.track_name(), Some("Okayama"));
        assert!(session.player().is_none());
        assert!(session.player_car_name().is_none());
    }

    #[test]
    fn track_name_falls_back_to_internal_name() {
        let session = SessionInfo::parse("WeekendInfo:\n TrackName: lagunaseca\n")
            .expect("session yaml should parse");
        assert_eq!(session.track_name(), Some("lagunaseca"));

        let empty = SessionInfo::parse("WeekendInfo:\n TrackLength: 1 km\n").unwrap();
        assert_eq!(empty.track_name(), None);
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = SessionInfo::parse("WeekendInfo: [unterminated").unwrap_err();
        assert!(matches!(err, crate::RelayError::Parse { .. }));
    }
}
