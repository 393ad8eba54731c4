use crate::client::DeviceClient;
use crate::db::models::NewReading;
use crate::db::store::Store;
use crate::models::device::DeviceReading;
use crate::utils::sleep_unless_stopped;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// What one polling cycle achieved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub sync_timestamp: i64,
    pub devices_ok: usize,
    pub devices_failed: usize,
    pub readings_stored: usize,
    pub sensors_registered: usize,
}

/// Poll every device once and store whatever they return under `sync_timestamp`.
///
/// A failing device or a failing insert is logged and skipped; the cycle
/// itself always completes.
pub fn collect_cycle(store: &mut Store, client: &DeviceClient, addresses: &[String], sync_timestamp: i64) -> CycleReport {
    let mut report = CycleReport {
        sync_timestamp,
        ..Default::default()
    };

    for address in addresses {
        debug!("Processing device {}", address);
        let readings = match client.fetch(address) {
            Ok(r) => r,
            Err(e) if e.is_transport() => {
                warn!("Device {} unavailable this cycle: {}", address, e);
                report.devices_failed += 1;
                continue;
            }
            Err(e) => {
                warn!("Device {} returned an unusable answer: {}", address, e);
                report.devices_failed += 1;
                continue;
            }
        };
        report.devices_ok += 1;

        let fetched_at = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        store_batch(store, address, &readings, sync_timestamp, fetched_at, &mut report);
    }

    report
}

fn store_batch(
    store: &mut Store,
    address: &str,
    readings: &[DeviceReading],
    sync_timestamp: i64,
    fetched_at: f64,
    report: &mut CycleReport,
) {
    for reading in readings {
        debug!(
            "Device {}: sensor {} at {:.2} degC",
            address, reading.sensor_id, reading.temp_deg_c
        );

        if let Err(e) = store.ensure_default_grouping() {
            error!("Ensuring default grouping failed: {}", e);
        }
        match store.ensure_sensor(&reading.sensor_id) {
            Ok(true) => {
                info!("Registered new sensor {} (ungrouped, inactive)", reading.sensor_id);
                report.sensors_registered += 1;
            }
            Ok(false) => {}
            Err(e) => error!("Registering sensor {} failed: {}", reading.sensor_id, e),
        }

        let row = NewReading {
            sync_timestamp,
            timestamp: fetched_at,
            sensor_id: &reading.sensor_id,
            temp_deg_c: reading.temp_deg_c,
        };
        match store.insert_reading(&row) {
            Ok(()) => report.readings_stored += 1,
            Err(e) => error!("Storing reading for sensor {} failed: {}", reading.sensor_id, e),
        }
    }
}

/// Sync timestamp for a new cycle: wall-clock seconds, never below the previous cycle's.
pub fn next_sync_timestamp(previous: Option<i64>, now: i64) -> i64 {
    match previous {
        Some(prev) if prev > now => prev,
        _ => now,
    }
}

/// Run cycles on a steady cadence until `stop` is raised.
pub fn run_loop(
    store: &mut Store,
    client: &DeviceClient,
    addresses: &[String],
    interval: Duration,
    stop: &AtomicBool,
) {
    let mut previous = None;
    while !stop.load(Ordering::SeqCst) {
        let tick_start = Instant::now();
        let sync_timestamp = next_sync_timestamp(previous, Utc::now().timestamp());
        previous = Some(sync_timestamp);

        info!("Gathering data from {} device(s)", addresses.len());
        let report = collect_cycle(store, client, addresses, sync_timestamp);
        info!(
            "Cycle {} complete: {} reading(s) from {}/{} device(s), {} new sensor(s)",
            report.sync_timestamp,
            report.readings_stored,
            report.devices_ok,
            addresses.len(),
            report.sensors_registered
        );

        // Maintain steady cadence
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            debug!("Sleeping for {:.1}s", (interval - elapsed).as_secs_f64());
            sleep_unless_stopped(interval - elapsed, stop);
        }
    }
    info!("Collector stopped");
}
