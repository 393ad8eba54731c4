use crate::db::models::JoinedReading;
use crate::db::store::Store;
use crate::utils::format_sync_time;

/// Which readings to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryFilter {
    All,
    Sensor(String),
    Grouping(i32),
}

pub fn run(store: &mut Store, filter: &HistoryFilter) -> Result<usize, String> {
    let rows = match filter {
        HistoryFilter::All => store.joined_readings(),
        HistoryFilter::Sensor(id) => store.readings_for_sensor(id),
        HistoryFilter::Grouping(id) => store.readings_for_grouping(*id),
    }
    .map_err(|e| format!("load history failed: {}", e))?;

    println!("{:19} | {:20} | {:30} | {:6} | {:>6}", "Sync time", "Sensor", "Grouping", "Role", "Temp");
    for row in &rows {
        println!("{}", render_line(row));
    }
    Ok(rows.len())
}

pub fn render_line(row: &JoinedReading) -> String {
    let when = row
        .reading
        .sync_timestamp
        .map(format_sync_time)
        .unwrap_or_else(|| format!("{:19}", "?"));
    let temp = row
        .reading
        .temp_deg_c
        .map(|t| format!("{:6.1}", t))
        .unwrap_or_else(|| format!("{:>6}", "--"));
    format!(
        "{} | {:20.20} | {:30.30} | {:6} | {}",
        when,
        row.reading.sensor_id,
        row.grouping.display_name(),
        row.sensor.role().map_or("-", |r| r.label()),
        temp
    )
}
