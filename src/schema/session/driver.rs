//! Driver information structures

use serde::{Deserialize, Serialize};

/// Driver information: the local driver's car index plus the entry list
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
#[serde(default)]
pub struct DriverInfoData {
    /// Car index of the local driver
    pub driver_car_idx: Option<i32>,
    /// List of all cars in the session
    pub drivers: Option<Vec<Driver>>,
}

impl DriverInfoData {
    /// Entry whose `CarIdx` matches the local driver's car index.
    pub fn player(&self) -> Option<&Driver> {
        let idx = self.driver_car_idx?;
        self.drivers.as_ref()?.iter().find(|driver| driver.car_idx == idx)
    }
}

/// Individual entry from the Drivers list
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
#[serde(default)]
pub struct Driver {
    pub car_idx: i32,
    pub user_name: String,
    pub car_screen_name: Option<String>,
}
