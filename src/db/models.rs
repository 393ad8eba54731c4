//! Diesel model structs for the three logger relations.
//!
//! Boolean and enum-like columns are stored as integers (the schema predates
//! this crate), so the accessors below translate them.

use diesel::prelude::*;
use serde::Serialize;

use crate::schema;

/// Grouping id reserved for sensors that have not been assigned anywhere yet.
pub const UNGROUPED_ID: i32 = 0;
pub const UNGROUPED_NAME: &str = "DefaultGroup";

/// Raw `flow1_return0` value of a sensor whose role has not been configured.
pub const ROLE_UNSET: i32 = -1;

/// Role a sensor plays inside its grouping.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum SensorRole {
    Flow,
    Return,
}

impl SensorRole {
    pub fn from_db(value: Option<i32>) -> Option<Self> {
        match value {
            Some(1) => Some(SensorRole::Flow),
            Some(0) => Some(SensorRole::Return),
            _ => None,
        }
    }

    pub fn to_db(self) -> i32 {
        match self {
            SensorRole::Flow => 1,
            SensorRole::Return => 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SensorRole::Flow => "flow",
            SensorRole::Return => "return",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize)]
#[diesel(table_name = schema::groupings)]
#[diesel(primary_key(grouping_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Grouping {
    pub grouping_id: i32,
    pub grouping_pretty_name: Option<String>,
    pub grouping_short_name: Option<String>,
    pub is_grouping_active: Option<i32>,
}

impl Grouping {
    pub fn is_active(&self) -> bool {
        self.is_grouping_active.is_some_and(|v| v != 0)
    }

    pub fn display_name(&self) -> &str {
        self.grouping_pretty_name.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::groupings)]
pub struct NewGrouping<'a> {
    pub grouping_id: i32,
    pub grouping_pretty_name: Option<&'a str>,
    pub grouping_short_name: Option<&'a str>,
    pub is_grouping_active: i32,
}

impl NewGrouping<'static> {
    /// The permanent, inactive bucket every newly discovered sensor lands in.
    pub fn ungrouped() -> Self {
        NewGrouping {
            grouping_id: UNGROUPED_ID,
            grouping_pretty_name: Some(UNGROUPED_NAME),
            grouping_short_name: None,
            is_grouping_active: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize)]
#[diesel(table_name = schema::sensors)]
#[diesel(primary_key(sensor_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Sensor {
    pub sensor_id: String,
    pub sensor_pretty_name: Option<String>,
    pub sensor_short_name: Option<String>,
    pub is_sensor_active: Option<i32>,
    pub grouping_id: i32,
    pub flow1_return0: Option<i32>,
    pub calibration_correction: Option<f64>,
}

impl Sensor {
    pub fn is_active(&self) -> bool {
        self.is_sensor_active.is_some_and(|v| v != 0)
    }

    pub fn role(&self) -> Option<SensorRole> {
        SensorRole::from_db(self.flow1_return0)
    }

    pub fn display_name(&self) -> &str {
        self.sensor_pretty_name.as_deref().unwrap_or("")
    }

    pub fn short_name(&self) -> &str {
        self.sensor_short_name.as_deref().unwrap_or("")
    }
}

/// Placeholder registration for a sensor seen for the first time.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::sensors)]
pub struct NewSensor<'a> {
    pub sensor_id: &'a str,
    pub sensor_pretty_name: Option<&'a str>,
    pub sensor_short_name: Option<&'a str>,
    pub is_sensor_active: i32,
    pub grouping_id: i32,
    pub flow1_return0: i32,
    pub calibration_correction: f64,
}

impl<'a> NewSensor<'a> {
    pub fn placeholder(sensor_id: &'a str) -> Self {
        NewSensor {
            sensor_id,
            sensor_pretty_name: None,
            sensor_short_name: None,
            is_sensor_active: 0,
            grouping_id: UNGROUPED_ID,
            flow1_return0: ROLE_UNSET,
            calibration_correction: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize)]
#[diesel(table_name = schema::temperature_data)]
#[diesel(primary_key(data_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Reading {
    pub data_id: i64,
    pub sync_timestamp: Option<i64>,
    pub timestamp: Option<f64>,
    pub sensor_id: String,
    pub temp_deg_c: Option<f64>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::temperature_data)]
pub struct NewReading<'a> {
    pub sync_timestamp: i64,
    pub timestamp: f64,
    pub sensor_id: &'a str,
    pub temp_deg_c: f64,
}

/// One reading joined to its sensor and that sensor's grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedReading {
    pub reading: Reading,
    pub sensor: Sensor,
    pub grouping: Grouping,
}

impl From<(Reading, Sensor, Grouping)> for JoinedReading {
    fn from((reading, sensor, grouping): (Reading, Sensor, Grouping)) -> Self {
        JoinedReading {
            reading,
            sensor,
            grouping,
        }
    }
}
