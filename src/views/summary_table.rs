//! Console table of per-radiator flow/return temperatures.

use crate::db::store::Store;
use crate::services::selection::{self, SelectionError};
use crate::services::summary::{self, SortSpec, SummaryRow};
use crate::utils::{clear_screen, format_sync_time, sleep_unless_stopped};
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const NAME_WIDTH: usize = 50;
const SENSOR_NAME_WIDTH: usize = 30;
const BLANK_VALUE: &str = " --  ";
const RULE: &str = "--------------------------------------------------------------------------------------------------";
const EMPTY_CELLS: &str = "     |             |             |             |";

/// Which snapshot to summarise.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Snapshot {
    /// Second-to-last sync timestamp (the newest may still be mid-write).
    Latest,
    /// Exact sync timestamp, or the closest stored one.
    At(i64),
    /// Counted back from the newest; 1 is the newest.
    Index(usize),
}

/// Print one summary, then keep re-rendering on new data when `follow` is set.
pub fn run(
    store: &mut Store,
    snapshot: Snapshot,
    sort: Option<SortSpec>,
    follow: bool,
    follow_interval: Duration,
    stop: &AtomicBool,
) -> Result<(), String> {
    if follow {
        clear_screen();
    }
    let mut shown = print_snapshot(store, snapshot, sort)?;
    if !follow {
        return Ok(());
    }

    info!("Following new data every {:.1}s", follow_interval.as_secs_f64());
    while !stop.load(Ordering::SeqCst) {
        sleep_unless_stopped(follow_interval, stop);
        shown = follow_step(store, shown, sort);
    }
    Ok(())
}

/// One follow-mode poll: re-render if a newer stable snapshot exists.
///
/// Read failures are logged and the previous snapshot stays on screen.
/// Returns the sync timestamp now shown.
fn follow_step(store: &mut Store, shown: i64, sort: Option<SortSpec>) -> i64 {
    let timestamps = match store.distinct_sync_timestamps() {
        Ok(ts) => ts,
        Err(e) => {
            error!("Load sync timestamps failed, retrying: {}", e);
            return shown;
        }
    };
    let latest = match selection::latest_stable(&timestamps) {
        Ok(ts) => ts,
        Err(e) => {
            error!("{}", e);
            return shown;
        }
    };
    if latest == shown {
        return shown;
    }
    debug!("New snapshot {} available", latest);
    clear_screen();
    match print_snapshot(store, Snapshot::Latest, sort) {
        Ok(ts) => ts,
        Err(e) => {
            error!("Rendering snapshot {} failed, retrying: {}", latest, e);
            shown
        }
    }
}

/// Resolve `snapshot`, print its summary and return the sync timestamp shown.
///
/// When `Snapshot::At` had no exact match the header names the requested time too.
fn print_snapshot(store: &mut Store, snapshot: Snapshot, sort: Option<SortSpec>) -> Result<i64, String> {
    let (sync_timestamp, readings, requested) = match snapshot {
        Snapshot::At(ts) => {
            let found = store
                .readings_near(ts)
                .map_err(|e| format!("load readings near {} failed: {}", ts, e))?
                .ok_or_else(|| SelectionError::NoData.to_string())?;
            let requested = found.substituted().then_some(found.requested);
            (found.sync_timestamp, found.readings, requested)
        }
        Snapshot::Latest | Snapshot::Index(_) => {
            let timestamps = store
                .distinct_sync_timestamps()
                .map_err(|e| format!("load sync timestamps failed: {}", e))?;
            let ts = match snapshot {
                Snapshot::Index(n) => selection::by_index(&timestamps, n),
                _ => selection::latest_stable(&timestamps),
            }
            .map_err(|e| e.to_string())?;
            let readings = store
                .readings_at(ts)
                .map_err(|e| format!("load readings for {} failed: {}", ts, e))?;
            (ts, readings, None)
        }
    };

    let groupings = store.all_groupings().map_err(|e| format!("load groupings failed: {}", e))?;
    let sensors = store.all_sensors().map_err(|e| format!("load sensors failed: {}", e))?;
    let mut built = summary::build(&groupings, &sensors, &readings);
    if let Some(spec) = sort {
        summary::sort_rows(&mut built.rows, spec);
    }

    print!("{}", render(&built.rows, sync_timestamp, requested, sort));
    Ok(sync_timestamp)
}

pub fn render(rows: &[SummaryRow], sync_timestamp: i64, requested: Option<i64>, sort: Option<SortSpec>) -> String {
    let mut out = String::new();
    out.push('\n');
    out.push_str(&format_sync_time(sync_timestamp));
    if let Some(requested) = requested {
        out.push_str(&format!(" (closest to requested {})", format_sync_time(requested)));
    }
    out.push_str("\n\n");
    out.push_str(&sort_line(sort));
    out.push('\n');
    out.push_str(&header());
    for row in rows {
        out.push_str(&render_row(row));
    }
    out
}

fn sort_line(sort: Option<SortSpec>) -> String {
    match sort {
        Some(spec) => format!(
            "Sorted by{} {}",
            if spec.ascending { " inverse" } else { "" },
            spec.key.label()
        ),
        None => "Sorted by".to_string(),
    }
}

fn header() -> String {
    format!(
        "\n{:width$}|  Flow temp  | Return temp | Difference  |\n{}\n",
        "",
        RULE,
        width = NAME_WIDTH + 5
    )
}

/// `%.1f` squeezed into exactly five characters, or a blank placeholder.
pub fn value_or_blank(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:5.5}", format!("{:.1}", v)),
        _ => BLANK_VALUE.to_string(),
    }
}

fn fixed(text: &str, width: usize) -> String {
    format!("{:width$.width$}", text, width = width)
}

pub fn render_row(row: &SummaryRow) -> String {
    let flow_name = row.flow_sensor_name.as_deref().unwrap_or("");
    let return_name = row.return_sensor_name.as_deref().unwrap_or("");
    format!(
        "{name}{empty}\n   Flow sensor   -> {flow_name}     |    {flow}    |    {ret}    |    {diff}    |\n   Return sensor -> {return_name}{empty}\n{rule}\n",
        name = fixed(&row.grouping_name, NAME_WIDTH),
        empty = EMPTY_CELLS,
        flow_name = fixed(flow_name, SENSOR_NAME_WIDTH),
        flow = value_or_blank(row.flow_temp),
        ret = value_or_blank(row.return_temp),
        diff = value_or_blank(row.difference),
        return_name = fixed(return_name, SENSOR_NAME_WIDTH),
        rule = RULE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::SensorRole;
    use crate::db::store::tests::{add_reading, memory_store};
    use crate::db::store::SensorUpdate;
    use crate::services::summary::SortKey;

    #[test]
    fn values_are_five_characters_wide() {
        assert_eq!(value_or_blank(Some(41.27)), "41.3 ");
        assert_eq!(value_or_blank(Some(7.0)), "7.0  ");
        assert_eq!(value_or_blank(Some(100.04)), "100.0");
        assert_eq!(value_or_blank(Some(-12.5)), "-12.5");
        assert_eq!(value_or_blank(None), " --  ");
        assert_eq!(value_or_blank(Some(f64::NAN)), " --  ");
    }

    #[test]
    fn row_lines_line_up_with_header() {
        let row = SummaryRow {
            grouping_name: "A very long radiator name that certainly exceeds fifty characters".into(),
            flow_sensor_name: Some("flow".into()),
            return_sensor_name: None,
            flow_temp: Some(55.0),
            ..Default::default()
        };
        let text = render_row(&row);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].len(), RULE.len());
        assert_eq!(lines[1].len(), RULE.len());
        assert_eq!(lines[2].len(), RULE.len());
        assert!(lines[1].contains("|    55.0     |     --      |     --      |"));
        assert!(lines[0].starts_with("A very long radiator name that certainly exceeds f     |"));

        let head = header();
        assert_eq!(head.lines().nth(1).map(str::len), Some(RULE.len()));
    }

    #[test]
    fn sort_line_mentions_direction() {
        let spec = SortSpec {
            key: SortKey::FlowTemp,
            ascending: true,
        };
        assert_eq!(sort_line(Some(spec)), "Sorted by inverse flow temperature");
        assert_eq!(
            sort_line(Some(SortSpec {
                key: SortKey::Difference,
                ascending: false
            })),
            "Sorted by difference"
        );
    }

    #[test]
    fn empty_store_is_a_no_data_error() {
        let mut store = memory_store();
        let stop = AtomicBool::new(false);
        let err = run(&mut store, Snapshot::Latest, None, false, Duration::from_secs(1), &stop).unwrap_err();
        assert_eq!(err, SelectionError::NoData.to_string());
        let err = run(&mut store, Snapshot::At(5), None, false, Duration::from_secs(1), &stop).unwrap_err();
        assert_eq!(err, SelectionError::NoData.to_string());
    }

    #[test]
    fn latest_snapshot_skips_the_newest_cycle() {
        let mut store = memory_store();
        add_reading(&mut store, 100, "f", 50.0);
        add_reading(&mut store, 200, "f", 60.0);
        add_reading(&mut store, 300, "f", 70.0);
        let lounge = store.create_grouping("Lounge", None).unwrap();
        store
            .configure_sensor(
                "f",
                &SensorUpdate {
                    grouping_id: Some(lounge),
                    role: Some(SensorRole::Flow),
                    active: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(print_snapshot(&mut store, Snapshot::Latest, None), Ok(200));
        assert_eq!(print_snapshot(&mut store, Snapshot::Index(1), None), Ok(300));
        assert_eq!(print_snapshot(&mut store, Snapshot::At(120), None), Ok(100));
        assert!(print_snapshot(&mut store, Snapshot::Index(9), None).is_err());
    }

    #[test]
    fn follow_step_tracks_new_snapshots() {
        let mut store = memory_store();
        add_reading(&mut store, 100, "f", 50.0);
        add_reading(&mut store, 200, "f", 60.0);
        assert_eq!(follow_step(&mut store, 100, None), 100);

        add_reading(&mut store, 300, "f", 70.0);
        assert_eq!(follow_step(&mut store, 100, None), 200);
        assert_eq!(follow_step(&mut store, 200, None), 200);
    }

    #[test]
    fn follow_step_survives_failed_reads() {
        let mut store = memory_store();
        add_reading(&mut store, 100, "f", 50.0);
        assert!(store.run("DROP TABLE temperature_data").is_some());
        assert_eq!(follow_step(&mut store, 100, None), 100);
    }

    #[test]
    fn header_names_substituted_timestamp() {
        let text = render(&[], 200, Some(180), None);
        assert!(text.starts_with("\n01/01/1970 00:03:20 (closest to requested 01/01/1970 00:03:00)\n\n"));
        assert!(text.contains("\nSorted by\n"));

        let exact = render(&[], 200, None, None);
        assert!(exact.starts_with("\n01/01/1970 00:03:20\n\n"));
        assert!(!exact.contains("closest"));
    }
}
