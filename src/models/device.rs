//! Wire format served by the sensor nodes.
//!
//! A node answers `GET /` with a JSON array, one object per attached probe:
//! `[{"SensorID": "28-0316a2794aff", "TempDegC": 41.5}, ...]`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReading {
    #[serde(rename = "SensorID")]
    pub sensor_id: String,
    #[serde(rename = "TempDegC")]
    pub temp_deg_c: f64,
}
