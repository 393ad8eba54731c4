//! SVG chart with one panel per active grouping: flow in red, return in blue.

use crate::db::models::{JoinedReading, SensorRole};
use crate::db::store::Store;
use crate::utils::format_sync_time;
use log::{info, warn};
use plotters::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_PLOT_PATH: &str = "radiators.svg";
const PANEL_HEIGHT: u32 = 320;
const WIDTH: u32 = 1200;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panel {
    pub grouping_id: i32,
    pub title: String,
    pub flow: Vec<(i64, f64)>,
    pub ret: Vec<(i64, f64)>,
}

impl Panel {
    fn points(&self) -> impl Iterator<Item = &(i64, f64)> {
        self.flow.iter().chain(self.ret.iter())
    }

    fn x_range(&self) -> (i64, i64) {
        let (lo, hi) = self
            .points()
            .fold((i64::MAX, i64::MIN), |(lo, hi), (x, _)| (lo.min(*x), hi.max(*x)));
        if lo > hi { (0, 1) } else if lo == hi { (lo - 1, hi + 1) } else { (lo, hi) }
    }

    fn y_range(&self) -> (f64, f64) {
        let (lo, hi) = self
            .points()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, y)| (lo.min(*y), hi.max(*y)));
        if lo > hi { (0.0, 1.0) } else { (lo - 1.0, hi + 1.0) }
    }
}

/// Group readings of active sensors in active groupings by grouping, ordered by id.
pub fn panels(rows: &[JoinedReading]) -> Vec<Panel> {
    let mut by_grouping: BTreeMap<i32, Panel> = BTreeMap::new();
    for row in rows {
        if !row.grouping.is_active() || !row.sensor.is_active() {
            continue;
        }
        let (Some(sync), Some(temp)) = (row.reading.sync_timestamp, row.reading.temp_deg_c) else {
            continue;
        };
        let panel = by_grouping.entry(row.grouping.grouping_id).or_insert_with(|| Panel {
            grouping_id: row.grouping.grouping_id,
            title: row.grouping.display_name().to_string(),
            ..Default::default()
        });
        match row.sensor.role() {
            Some(SensorRole::Flow) => panel.flow.push((sync, temp)),
            Some(SensorRole::Return) => panel.ret.push((sync, temp)),
            None => {}
        }
    }
    let mut out: Vec<Panel> = by_grouping.into_values().collect();
    for panel in &mut out {
        panel.flow.sort_by_key(|p| p.0);
        panel.ret.sort_by_key(|p| p.0);
    }
    out
}

pub fn render_svg(panels: &[Panel], path: &Path) -> Result<(), String> {
    let height = PANEL_HEIGHT * panels.len().max(1) as u32;
    let root = SVGBackend::new(path, (WIDTH, height)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| e.to_string())?;

    let areas = root.split_evenly((panels.len().max(1), 1));
    for (panel, area) in panels.iter().zip(areas.iter()) {
        let (x_lo, x_hi) = panel.x_range();
        let (y_lo, y_hi) = panel.y_range();
        let mut chart = ChartBuilder::on(area)
            .caption(&panel.title, ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(35)
            .y_label_area_size(50)
            .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
            .map_err(|e| e.to_string())?;

        chart
            .configure_mesh()
            .x_labels(6)
            .x_label_formatter(&|x| format_sync_time(*x))
            .y_desc("Temp C")
            .draw()
            .map_err(|e| e.to_string())?;

        chart
            .draw_series(LineSeries::new(panel.flow.iter().copied(), &RED))
            .map_err(|e| e.to_string())?
            .label("flow")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));
        chart
            .draw_series(LineSeries::new(panel.ret.iter().copied(), &BLUE))
            .map_err(|e| e.to_string())?
            .label("return")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(|e| e.to_string())?;
    }

    root.present().map_err(|e| e.to_string())
}

pub fn plot_to_path(store: &mut Store, path: &Path) -> Result<usize, String> {
    let rows = store
        .joined_readings()
        .map_err(|e| format!("load readings for plot failed: {}", e))?;
    let panels = panels(&rows);
    if panels.is_empty() {
        warn!("No active groupings with data; the chart will be empty");
    }
    render_svg(&panels, path)?;
    info!("Plotted {} grouping(s) to {}", panels.len(), path.display());
    Ok(panels.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::tests::{add_reading, memory_store};
    use crate::db::store::SensorUpdate;

    fn configured_store() -> Store {
        let mut store = memory_store();
        add_reading(&mut store, 200, "f", 55.0);
        add_reading(&mut store, 100, "f", 50.0);
        add_reading(&mut store, 100, "r", 40.0);
        add_reading(&mut store, 100, "idle", 20.0);
        let lounge = store.create_grouping("Lounge", None).unwrap();
        for (id, role) in [("f", SensorRole::Flow), ("r", SensorRole::Return)] {
            store
                .configure_sensor(
                    id,
                    &SensorUpdate {
                        grouping_id: Some(lounge),
                        role: Some(role),
                        active: Some(true),
                        ..Default::default()
                    },
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn panels_split_flow_and_return() {
        let mut store = configured_store();
        let panels = panels(&store.joined_readings().unwrap());
        assert_eq!(panels.len(), 1);
        assert_eq!(panels[0].title, "Lounge");
        assert_eq!(panels[0].flow, vec![(100, 50.0), (200, 55.0)]);
        assert_eq!(panels[0].ret, vec![(100, 40.0)]);
        assert_eq!(panels[0].x_range(), (100, 200));
        assert_eq!(panels[0].y_range(), (39.0, 56.0));
    }

    #[test]
    fn writes_svg_file() {
        let mut store = configured_store();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.svg");
        assert_eq!(plot_to_path(&mut store, &path), Ok(1));
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Lounge"));
        assert!(svg.contains("Temp C"));
    }

    #[test]
    fn single_point_ranges_are_widened() {
        let panel = Panel {
            flow: vec![(10, 30.0)],
            ..Default::default()
        };
        assert_eq!(panel.x_range(), (9, 11));
        assert_eq!(Panel::default().x_range(), (0, 1));
    }
}
