use chrono::DateTime;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Granularity at which interruptible sleeps check for a stop request.
const STOP_POLL: Duration = Duration::from_millis(250);

/// Lines printed to push the previous render out of view in follow mode.
const CLEAR_LINES: usize = 62;

/// Render a sync timestamp as `dd/mm/YYYY HH:MM:SS` (UTC), always 19 characters.
pub fn format_sync_time(sync_timestamp: i64) -> String {
    match DateTime::from_timestamp(sync_timestamp, 0) {
        Some(dt) => dt.format("%d/%m/%Y %H:%M:%S").to_string(),
        None => format!("{:>19}", sync_timestamp),
    }
}

pub fn clear_screen() {
    print!("{}", "\n".repeat(CLEAR_LINES));
}

/// Sleep for `total`, returning early once `stop` is raised.
pub fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(STOP_POLL));
    }
}
