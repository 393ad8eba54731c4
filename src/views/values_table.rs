//! Console grid of raw readings: one column per active sensor, one row per sync timestamp.
//!
//! Short names are meant to be at most four characters; longer ones are
//! truncated so every column stays six characters wide.

use crate::db::models::{Reading, Sensor};
use crate::db::store::Store;
use crate::utils::{format_sync_time, sleep_unless_stopped};
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const POLL: Duration = Duration::from_secs(1);
/// Wait after spotting a new cycle so the collector can finish writing it.
const SETTLE: Duration = Duration::from_secs(10);

/// Column layout derived from the sensor table.
#[derive(Debug, Clone, PartialEq)]
pub struct Columns {
    sensor_ids: Vec<String>,
    header: String,
    /// Fields whose change forces a new header.
    signature: Vec<(String, bool, String, i32)>,
}

impl Columns {
    pub fn from_sensors(sensors: &[Sensor]) -> Self {
        let mut active: Vec<&Sensor> = sensors.iter().filter(|s| s.is_active()).collect();
        active.sort_by(|a, b| a.short_name().cmp(b.short_name()));

        let mut header = String::from("\nSensor Name         : ");
        for s in &active {
            header.push_str(&format!("{:4.4}  ", s.short_name()));
        }
        header.push('\n');
        header.push_str(&"-".repeat(21 + 6 * active.len()));
        header.push('\n');

        let mut signature: Vec<_> = sensors
            .iter()
            .map(|s| (s.sensor_id.clone(), s.is_active(), s.short_name().to_string(), s.grouping_id))
            .collect();
        signature.sort();

        Columns {
            sensor_ids: active.iter().map(|s| s.sensor_id.clone()).collect(),
            header,
            signature,
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    /// Render the row for one snapshot; `Err` when a sensor has several readings in it.
    pub fn render_row(&self, sync_timestamp: i64, readings: &[Reading]) -> Result<String, String> {
        let mut line = format_sync_time(sync_timestamp);
        line.push_str(" : ");
        for sensor_id in &self.sensor_ids {
            let mut hits = readings.iter().filter(|r| &r.sensor_id == sensor_id);
            match (hits.next(), hits.next()) {
                (None, _) => line.push_str(" -- "),
                (Some(r), None) => match r.temp_deg_c {
                    Some(t) => line.push_str(&format!("{:4.1}", t)),
                    None => line.push_str(" -- "),
                },
                (Some(_), Some(_)) => {
                    return Err(format!(
                        "multiple values for sensor {} at sync timestamp {}",
                        sensor_id, sync_timestamp
                    ));
                }
            }
            line.push_str("  ");
        }
        Ok(line)
    }
}

/// Prints rows, repeating the header every `header_every` rows.
struct Printer {
    columns: Columns,
    header_every: usize,
    rows_since_header: usize,
}

impl Printer {
    fn new(columns: Columns, header_every: usize) -> Self {
        print!("{}", columns.header());
        Printer {
            columns,
            header_every,
            rows_since_header: 0,
        }
    }

    fn replace_columns(&mut self, columns: Columns) {
        self.columns = columns;
        self.rows_since_header = 0;
        print!("{}", self.columns.header());
    }

    fn print(&mut self, sync_timestamp: i64, readings: &[Reading]) {
        if self.rows_since_header >= self.header_every {
            self.rows_since_header = 0;
            print!("{}", self.columns.header());
        }
        match self.columns.render_row(sync_timestamp, readings) {
            Ok(line) => {
                println!("{}", line);
                self.rows_since_header += 1;
            }
            Err(e) => error!("Skipping row: {}", e),
        }
    }
}

/// Last `count` entries of the ascending `timestamps`, or all of them.
pub fn tail(timestamps: &[i64], count: Option<usize>) -> &[i64] {
    match count {
        Some(n) if n < timestamps.len() => &timestamps[timestamps.len() - n..],
        _ => timestamps,
    }
}

pub fn run(
    store: &mut Store,
    rows_to_print: Option<usize>,
    header_every: usize,
    follow: bool,
    stop: &AtomicBool,
) -> Result<(), String> {
    let sensors = store.all_sensors().map_err(|e| format!("load sensors failed: {}", e))?;
    let mut printer = Printer::new(Columns::from_sensors(&sensors), header_every);

    let timestamps = store
        .distinct_sync_timestamps()
        .map_err(|e| format!("load sync timestamps failed: {}", e))?;
    for ts in tail(&timestamps, rows_to_print) {
        let readings = store
            .readings_at(*ts)
            .map_err(|e| format!("load readings for {} failed: {}", ts, e))?;
        printer.print(*ts, &readings);
    }
    if !follow {
        return Ok(());
    }

    let mut last_shown = timestamps.last().copied().unwrap_or(0);
    info!("Following new readings after {}", last_shown);
    while !stop.load(Ordering::SeqCst) {
        sleep_unless_stopped(POLL, stop);
        last_shown = follow_step(store, &mut printer, last_shown, SETTLE, stop);
    }
    Ok(())
}

/// One follow-mode poll: refresh the header if the sensor layout changed and
/// print every snapshot newer than `last_shown`.
///
/// Read failures are logged and retried on the next poll. Returns the newest
/// sync timestamp printed so far.
fn follow_step(store: &mut Store, printer: &mut Printer, last_shown: i64, settle: Duration, stop: &AtomicBool) -> i64 {
    match store.all_sensors() {
        Ok(sensors) => {
            let columns = Columns::from_sensors(&sensors);
            if columns.signature != printer.columns.signature {
                debug!("Sensor configuration changed; reprinting header");
                printer.replace_columns(columns);
            }
        }
        Err(e) => error!("Load sensors failed, retrying: {}", e),
    }

    let timestamps = match store.distinct_sync_timestamps() {
        Ok(ts) => ts,
        Err(e) => {
            error!("Load sync timestamps failed, retrying: {}", e);
            return last_shown;
        }
    };
    let Some(&newest) = timestamps.last().filter(|ts| **ts > last_shown) else {
        return last_shown;
    };

    sleep_unless_stopped(settle, stop);
    let fresh = match store.readings_between(last_shown, newest) {
        Ok(rows) => rows,
        Err(e) => {
            error!("Load readings after {} failed, retrying: {}", last_shown, e);
            return last_shown;
        }
    };
    for ts in timestamps.iter().filter(|ts| **ts > last_shown && **ts <= newest) {
        let snapshot: Vec<Reading> = fresh
            .iter()
            .filter(|r| r.sync_timestamp == Some(*ts))
            .cloned()
            .collect();
        printer.print(*ts, &snapshot);
    }
    newest
}
