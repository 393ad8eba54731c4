//! Runtime configuration, read once at startup from the environment.
//! A `.env` file (explicit `--env-file`, else `./.env`) may supply values;
//! variables already set in the process environment take precedence.

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATABASE_PATH: &str = "radiator_temps.db";
pub const DEFAULT_POLL_SECS: f64 = 60.0;
pub const DEFAULT_DEVICE_TIMEOUT_SECS: f64 = 5.0;
pub const DEFAULT_PRINT_ROWS: i64 = 20;
pub const DEFAULT_HEADER_EVERY_N_ROWS: usize = 20;
pub const DEFAULT_FOLLOW_SECS: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file shared by the collector and the viewers.
    pub database_path: String,
    /// Sensor nodes to poll, as `host[:port]`.
    pub device_addresses: Vec<String>,
    pub poll_interval: Duration,
    /// Per-request timeout for a sensor node.
    pub device_timeout: Duration,
    /// How many recent snapshots the values view prints; `None` prints all.
    pub print_rows: Option<usize>,
    pub header_every_n_rows: usize,
    /// Refresh cadence of the follow-mode viewers.
    pub follow_interval: Duration,
}

#[derive(Debug)]
pub struct LoadedEnvFile {
    pub path: PathBuf,
    pub explicit: bool,
}

/// Load `explicit` if given (it must exist), otherwise `./.env` when present.
pub fn load_env_file(explicit: Option<&Path>) -> Result<Option<LoadedEnvFile>, String> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        dotenvy::from_path(path).map_err(|e| format!("failed to load {}: {}", path.display(), e))?;
        return Ok(Some(LoadedEnvFile {
            path: path.to_path_buf(),
            explicit: true,
        }));
    }

    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(LoadedEnvFile { path, explicit: false })),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(format!("failed to load .env: {}", e)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let non_empty = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_path = non_empty("DATABASE_PATH").unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());

        let device_addresses = match non_empty("DEVICE_ADDRESSES") {
            Some(raw) => parse_address_list(&raw)?,
            None => Vec::new(),
        };

        let poll_interval = seconds(non_empty("POLL_INTERVAL_SECS"), "POLL_INTERVAL_SECS", DEFAULT_POLL_SECS)?;
        let device_timeout = seconds(
            non_empty("DEVICE_TIMEOUT_SECS"),
            "DEVICE_TIMEOUT_SECS",
            DEFAULT_DEVICE_TIMEOUT_SECS,
        )?;
        let follow_interval = seconds(non_empty("FOLLOW_INTERVAL_SECS"), "FOLLOW_INTERVAL_SECS", DEFAULT_FOLLOW_SECS)?;

        let print_rows = match non_empty("PRINT_ROWS") {
            Some(s) => s
                .parse::<i64>()
                .map_err(|_| "PRINT_ROWS must be an integer (negative prints every row)".to_string())?,
            None => DEFAULT_PRINT_ROWS,
        };

        let header_every_n_rows = match non_empty("PRINT_HEADER_EVERY_N_ROWS") {
            Some(s) => s
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| "PRINT_HEADER_EVERY_N_ROWS must be a positive integer".to_string())?,
            None => DEFAULT_HEADER_EVERY_N_ROWS,
        };

        Ok(Config {
            database_path,
            device_addresses,
            poll_interval,
            device_timeout,
            print_rows: usize::try_from(print_rows).ok(),
            header_every_n_rows,
            follow_interval,
        })
    }
}

fn seconds(raw: Option<String>, key: &str, default: f64) -> Result<Duration, String> {
    let secs = match raw {
        Some(s) => s.parse::<f64>().map_err(|_| format!("{} must be a number of seconds", key))?,
        None => default,
    };
    Duration::try_from_secs_f64(secs).map_err(|_| format!("{} must be a non-negative number of seconds", key))
}

/// Accept either a JSON array (`["10.0.0.5", "10.0.0.6"]`) or a comma-separated list.
fn parse_address_list(raw: &str) -> Result<Vec<String>, String> {
    let items: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str(raw).map_err(|e| format!("DEVICE_ADDRESSES is not a valid JSON list: {}", e))?
    } else {
        raw.split(',').map(str::to_string).collect()
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
