//! Flat CSV dump of every reading joined with its sensor and grouping.

use crate::db::models::JoinedReading;
use crate::db::store::Store;
use log::info;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const DEFAULT_EXPORT_PATH: &str = "export.csv";

/// Must stay in field order with `ExportRow`.
const COLUMNS: [&str; 14] = [
    "data_id",
    "syncTimestamp",
    "timestamp",
    "sensorID",
    "tempDegC",
    "sensorPrettyName",
    "sensorShortName",
    "isSensorActiveBool",
    "grouping_id",
    "flow1_return0",
    "calibrationCorrection",
    "groupingPrettyName",
    "groupingShortName",
    "isGroupingActiveBool",
];

/// One CSV line; column names follow the database columns.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    data_id: i64,
    #[serde(rename = "syncTimestamp")]
    sync_timestamp: Option<i64>,
    timestamp: Option<f64>,
    #[serde(rename = "sensorID")]
    sensor_id: &'a str,
    #[serde(rename = "tempDegC")]
    temp_deg_c: Option<f64>,
    #[serde(rename = "sensorPrettyName")]
    sensor_pretty_name: Option<&'a str>,
    #[serde(rename = "sensorShortName")]
    sensor_short_name: Option<&'a str>,
    #[serde(rename = "isSensorActiveBool")]
    is_sensor_active: Option<i32>,
    grouping_id: i32,
    flow1_return0: Option<i32>,
    #[serde(rename = "calibrationCorrection")]
    calibration_correction: Option<f64>,
    #[serde(rename = "groupingPrettyName")]
    grouping_pretty_name: Option<&'a str>,
    #[serde(rename = "groupingShortName")]
    grouping_short_name: Option<&'a str>,
    #[serde(rename = "isGroupingActiveBool")]
    is_grouping_active: Option<i32>,
}

impl<'a> From<&'a JoinedReading> for ExportRow<'a> {
    fn from(j: &'a JoinedReading) -> Self {
        ExportRow {
            data_id: j.reading.data_id,
            sync_timestamp: j.reading.sync_timestamp,
            timestamp: j.reading.timestamp,
            sensor_id: &j.reading.sensor_id,
            temp_deg_c: j.reading.temp_deg_c,
            sensor_pretty_name: j.sensor.sensor_pretty_name.as_deref(),
            sensor_short_name: j.sensor.sensor_short_name.as_deref(),
            is_sensor_active: j.sensor.is_sensor_active,
            grouping_id: j.grouping.grouping_id,
            flow1_return0: j.sensor.flow1_return0,
            calibration_correction: j.sensor.calibration_correction,
            grouping_pretty_name: j.grouping.grouping_pretty_name.as_deref(),
            grouping_short_name: j.grouping.grouping_short_name.as_deref(),
            is_grouping_active: j.grouping.is_grouping_active,
        }
    }
}

/// Write a header line then `rows`; returns the number of data lines.
///
/// The header is written even when there are no rows.
pub fn write_csv<W: Write>(out: W, rows: &[JoinedReading]) -> Result<usize, csv::Error> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    writer.write_record(COLUMNS)?;
    for row in rows {
        writer.serialize(ExportRow::from(row))?;
    }
    writer.flush()?;
    Ok(rows.len())
}

pub fn export_to_path(store: &mut Store, path: &Path) -> Result<usize, String> {
    let rows = store
        .joined_readings()
        .map_err(|e| format!("load readings for export failed: {}", e))?;
    let file = File::create(path).map_err(|e| format!("create {} failed: {}", path.display(), e))?;
    let written = write_csv(file, &rows).map_err(|e| format!("write {} failed: {}", path.display(), e))?;
    info!("Exported {} reading(s) to {}", written, path.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::tests::{add_reading, memory_store};
    use crate::db::store::SensorUpdate;

    #[test]
    fn export_matches_joined_readings() {
        let mut store = memory_store();
        add_reading(&mut store, 100, "s1", 45.5);
        add_reading(&mut store, 100, "s2", 38.0);
        add_reading(&mut store, 160, "s1", 46.0);
        let hall = store.create_grouping("Hall", Some("H")).unwrap();
        store
            .configure_sensor(
                "s2",
                &SensorUpdate {
                    grouping_id: Some(hall),
                    ..Default::default()
                },
            )
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        assert_eq!(export_to_path(&mut store, &path), Ok(3));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 14);
        assert_eq!(&headers[1], "syncTimestamp");
        assert_eq!(&headers[13], "isGroupingActiveBool");

        let column = |name: &str| headers.iter().position(|h| h == name).unwrap();
        let (sensor, sync, temp, grouping) = (
            column("sensorID"),
            column("syncTimestamp"),
            column("tempDegC"),
            column("groupingPrettyName"),
        );
        let parsed: Vec<(String, i64, f64, String)> = reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                (
                    r[sensor].to_string(),
                    r[sync].parse().unwrap(),
                    r[temp].parse().unwrap(),
                    r[grouping].to_string(),
                )
            })
            .collect();

        let expected: Vec<(String, i64, f64, String)> = store
            .joined_readings()
            .unwrap()
            .into_iter()
            .map(|j| {
                (
                    j.reading.sensor_id,
                    j.reading.sync_timestamp.unwrap(),
                    j.reading.temp_deg_c.unwrap(),
                    j.grouping.grouping_pretty_name.unwrap_or_default(),
                )
            })
            .collect();
        assert_eq!(parsed, expected);
        assert!(parsed.iter().any(|(s, _, _, g)| s == "s2" && g == "Hall"));
    }

    #[test]
    fn empty_export_still_has_header_row() {
        let mut buf = Vec::new();
        assert_eq!(write_csv(&mut buf, &[]).unwrap(), 0);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert_eq!(text.trim_end(), COLUMNS.join(","));
    }

    #[test]
    fn header_matches_serialized_field_order() {
        let mut store = memory_store();
        add_reading(&mut store, 100, "s1", 45.5);
        let rows = store.joined_readings().unwrap();

        let mut derived = csv::Writer::from_writer(Vec::new());
        derived.serialize(ExportRow::from(&rows[0])).unwrap();
        let derived = String::from_utf8(derived.into_inner().unwrap()).unwrap();

        let mut buf = Vec::new();
        write_csv(&mut buf, &rows).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), derived);
    }

    #[test]
    fn empty_store_exports_header_only_file() {
        let mut store = memory_store();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        assert_eq!(export_to_path(&mut store, &path), Ok(0));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        assert_eq!(reader.headers().unwrap().len(), 14);
        assert_eq!(reader.records().count(), 0);
    }
}
