//! Per-grouping flow/return summaries for one snapshot of readings.
//!
//! Data anomalies (no sensor for a role, several sensors for a role, no
//! reading for a sensor) never abort the summary: the affected field stays
//! blank and a diagnostic is recorded and logged.

use crate::db::models::{Grouping, Reading, Sensor, SensorRole};
use log::warn;
use std::cmp::Ordering;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryRow {
    pub grouping_id: i32,
    pub grouping_name: String,
    pub flow_sensor_name: Option<String>,
    pub return_sensor_name: Option<String>,
    pub flow_temp: Option<f64>,
    pub return_temp: Option<f64>,
    /// Sync timestamp of the reading(s) the temperatures came from.
    pub sync_timestamp: Option<i64>,
    pub difference: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub rows: Vec<SummaryRow>,
    pub diagnostics: Vec<String>,
}

impl Summary {
    fn diagnose(&mut self, message: String) {
        warn!("{}", message);
        self.diagnostics.push(message);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SortKey {
    FlowTemp,
    ReturnTemp,
    Difference,
}

impl SortKey {
    pub fn label(self) -> &'static str {
        match self {
            SortKey::FlowTemp => "flow temperature",
            SortKey::ReturnTemp => "return temperature",
            SortKey::Difference => "difference",
        }
    }

    fn value(self, row: &SummaryRow) -> Option<f64> {
        match self {
            SortKey::FlowTemp => row.flow_temp,
            SortKey::ReturnTemp => row.return_temp,
            SortKey::Difference => row.difference,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub ascending: bool,
}

/// Build the summary for every active grouping, in grouping table order.
///
/// `readings` is the snapshot to report on, typically everything stored
/// under one sync timestamp. Only active sensors are considered.
pub fn build(groupings: &[Grouping], sensors: &[Sensor], readings: &[Reading]) -> Summary {
    let mut summary = Summary::default();

    for grouping in groupings.iter().filter(|g| g.is_active()) {
        let mut row = SummaryRow {
            grouping_id: grouping.grouping_id,
            grouping_name: grouping.display_name().to_string(),
            ..Default::default()
        };
        let members: Vec<&Sensor> = sensors
            .iter()
            .filter(|s| s.is_active() && s.grouping_id == grouping.grouping_id)
            .collect();

        for role in [SensorRole::Flow, SensorRole::Return] {
            let Some((name, reading)) = resolve_role(&mut summary, &row.grouping_name, &members, readings, role) else {
                continue;
            };
            match role {
                SensorRole::Flow => row.flow_sensor_name = Some(name),
                SensorRole::Return => row.return_sensor_name = Some(name),
            }
            if let Some(reading) = reading {
                match role {
                    SensorRole::Flow => row.flow_temp = reading.temp_deg_c,
                    SensorRole::Return => row.return_temp = reading.temp_deg_c,
                }
                row.sync_timestamp = reading.sync_timestamp.or(row.sync_timestamp);
            }
        }

        match (row.flow_temp, row.return_temp) {
            (Some(flow), Some(ret)) => row.difference = Some(flow - ret),
            (None, _) => summary.diagnose(format!("Flow temperature is missing for {}", row.grouping_name)),
            (_, None) => summary.diagnose(format!("Return temperature is missing for {}", row.grouping_name)),
        }

        summary.rows.push(row);
    }

    summary
}

/// Find the single sensor playing `role` and its single reading.
///
/// `None` when the sensor cannot be determined; `Some((name, None))` when the
/// sensor is known but has no usable reading.
fn resolve_role<'r>(
    summary: &mut Summary,
    grouping_name: &str,
    members: &[&Sensor],
    readings: &'r [Reading],
    role: SensorRole,
) -> Option<(String, Option<&'r Reading>)> {
    let candidates: Vec<&&Sensor> = members.iter().filter(|s| s.role() == Some(role)).collect();
    let sensor = match candidates.as_slice() {
        [] => {
            summary.diagnose(format!("No {} sensor found for grouping {}", role.label(), grouping_name));
            return None;
        }
        [one] => **one,
        _ => {
            summary.diagnose(format!("Too many {} sensors found for grouping {}", role.label(), grouping_name));
            return None;
        }
    };

    let matches: Vec<&Reading> = readings.iter().filter(|r| r.sensor_id == sensor.sensor_id).collect();
    let reading = match matches.as_slice() {
        [] => {
            summary.diagnose(format!("No {} temperature found for grouping {}", role.label(), grouping_name));
            None
        }
        [one] => Some(*one),
        _ => {
            summary.diagnose(format!(
                "Too many {} temperatures found for grouping {}",
                role.label(),
                grouping_name
            ));
            None
        }
    };
    Some((sensor.display_name().to_string(), reading))
}

/// Stable sort by `spec`; rows lacking the key value always go last.
pub fn sort_rows(rows: &mut [SummaryRow], spec: SortSpec) {
    rows.sort_by(|a, b| match (spec.key.value(a), spec.key.value(b)) {
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            if spec.ascending { ord } else { ord.reverse() }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}
