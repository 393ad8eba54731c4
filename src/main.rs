pub mod client;
pub mod config;
pub mod db {
    pub mod models;
    pub mod store;
}
pub mod models {
    pub mod device;
}
pub mod schema;
pub mod services {
    pub mod ingest;
    pub mod selection;
    pub mod summary;
}
pub mod utils;
pub mod views {
    pub mod export;
    pub mod history;
    pub mod plot;
    pub mod summary_table;
    pub mod values_table;
}

use crate::client::DeviceClient;
use crate::config::{Config, load_env_file};
use crate::db::models::SensorRole;
use crate::db::store::{SensorUpdate, Store};
use crate::services::ingest;
use crate::services::summary::{SortKey, SortSpec};
use crate::views::history::HistoryFilter;
use crate::views::summary_table::Snapshot;
use crate::views::{export, history, plot, summary_table, values_table};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use log::{debug, error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Parser, Debug)]
#[command(name = "radiator-logger", version)]
#[command(about = "Logs radiator flow/return temperatures from networked sensor nodes", long_about = None)]
struct Cli {
    /// Load environment from this file instead of ./.env
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database tables if they do not exist
    InitDb,
    /// Poll every configured sensor node on a fixed interval
    Collect,
    /// Per-radiator flow/return temperatures for one snapshot
    Summary(SummaryArgs),
    /// Raw readings, one column per active sensor
    Values {
        /// Keep printing new snapshots as they arrive
        #[arg(short, long)]
        follow: bool,
    },
    /// Every stored reading with its sensor and grouping
    History {
        #[arg(long, conflicts_with = "grouping")]
        sensor: Option<String>,
        #[arg(long)]
        grouping: Option<i32>,
    },
    /// Write all readings to a CSV file
    Export {
        #[arg(short, long, default_value = export::DEFAULT_EXPORT_PATH)]
        output: PathBuf,
    },
    /// Chart every active grouping to an SVG file
    Plot {
        #[arg(short, long, default_value = plot::DEFAULT_PLOT_PATH)]
        output: PathBuf,
    },
    /// Edit groupings and sensor metadata
    Configure {
        #[command(subcommand)]
        action: ConfigureAction,
    },
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("sort").args(["flow_sort", "return_sort", "diff_sort"])))]
struct SummaryArgs {
    /// Sort by flow temperature
    #[arg(short = 't', long = "flowSort")]
    flow_sort: bool,
    /// Sort by return temperature
    #[arg(long = "returnSort")]
    return_sort: bool,
    /// Sort by flow minus return
    #[arg(short = 'd', long = "diffSort")]
    diff_sort: bool,
    /// Sort ascending instead of descending
    #[arg(short = 'r', long = "reverseSort")]
    reverse_sort: bool,
    /// Re-render whenever a newer snapshot is stored
    #[arg(short, long, conflicts_with_all = ["timestamp", "index"])]
    follow: bool,
    /// Summarise the snapshot at (or closest to) this sync timestamp
    #[arg(long, conflicts_with = "index")]
    timestamp: Option<i64>,
    /// Summarise the n-th newest snapshot (1 = newest)
    #[arg(short, long)]
    index: Option<usize>,
}

impl SummaryArgs {
    fn sort(&self) -> Option<SortSpec> {
        let key = if self.flow_sort {
            SortKey::FlowTemp
        } else if self.return_sort {
            SortKey::ReturnTemp
        } else if self.diff_sort {
            SortKey::Difference
        } else {
            if self.reverse_sort {
                debug!("--reverseSort has no effect without a sort key");
            }
            return None;
        };
        Some(SortSpec {
            key,
            ascending: self.reverse_sort,
        })
    }

    fn snapshot(&self) -> Snapshot {
        match (self.timestamp, self.index) {
            (Some(ts), _) => Snapshot::At(ts),
            (None, Some(n)) => Snapshot::Index(n),
            (None, None) => Snapshot::Latest,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum RoleArg {
    Flow,
    Return,
}

impl From<RoleArg> for SensorRole {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Flow => SensorRole::Flow,
            RoleArg::Return => SensorRole::Return,
        }
    }
}

#[derive(Subcommand, Debug)]
enum ConfigureAction {
    /// Create a new active grouping and print its id
    AddGrouping {
        name: String,
        #[arg(long)]
        short_name: Option<String>,
    },
    /// Update a registered sensor; omitted options are left unchanged
    Sensor {
        sensor_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        short_name: Option<String>,
        #[arg(long)]
        grouping: Option<i32>,
        #[arg(long, value_enum)]
        role: Option<RoleArg>,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        calibration: Option<f64>,
    },
}

fn open_store(cfg: &Config) -> Result<Store, String> {
    let store = Store::open(&cfg.database_path)
        .map_err(|e| format!("opening database {} failed: {}", cfg.database_path, e))?;
    info!("Using database {}", cfg.database_path);
    Ok(store)
}

fn install_stop_flag() -> Result<Arc<AtomicBool>, String> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    ctrlc::set_handler(move || {
        info!("Stop requested; finishing current step");
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| format!("installing Ctrl-C handler failed: {}", e))?;
    Ok(stop)
}

fn run(command: Command) -> Result<(), String> {
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (database={}, devices={}, poll_interval={:.1}s, device_timeout={:.1}s)",
        cfg.database_path,
        cfg.device_addresses.len(),
        cfg.poll_interval.as_secs_f64(),
        cfg.device_timeout.as_secs_f64()
    );

    match command {
        Command::InitDb => {
            open_store(&cfg)?;
            info!("Database schema is ready");
            Ok(())
        }
        Command::Collect => {
            if cfg.device_addresses.is_empty() {
                return Err("DEVICE_ADDRESSES is empty; nothing to poll".to_string());
            }
            let mut store = open_store(&cfg)?;
            let client = DeviceClient::new(cfg.device_timeout);
            let stop = install_stop_flag()?;
            info!(
                "Starting collector: devices={}, interval={:.1}s",
                cfg.device_addresses.len(),
                cfg.poll_interval.as_secs_f64()
            );
            ingest::run_loop(&mut store, &client, &cfg.device_addresses, cfg.poll_interval, &stop);
            Ok(())
        }
        Command::Summary(args) => {
            let mut store = open_store(&cfg)?;
            let stop = install_stop_flag()?;
            summary_table::run(
                &mut store,
                args.snapshot(),
                args.sort(),
                args.follow,
                cfg.follow_interval,
                &stop,
            )
        }
        Command::Values { follow } => {
            let mut store = open_store(&cfg)?;
            let stop = install_stop_flag()?;
            values_table::run(&mut store, cfg.print_rows, cfg.header_every_n_rows, follow, &stop)
        }
        Command::History { sensor, grouping } => {
            let mut store = open_store(&cfg)?;
            let filter = match (sensor, grouping) {
                (Some(id), _) => HistoryFilter::Sensor(id),
                (None, Some(id)) => HistoryFilter::Grouping(id),
                (None, None) => HistoryFilter::All,
            };
            let count = history::run(&mut store, &filter)?;
            info!("{} reading(s) listed", count);
            Ok(())
        }
        Command::Export { output } => {
            let mut store = open_store(&cfg)?;
            export::export_to_path(&mut store, &output).map(|_| ())
        }
        Command::Plot { output } => {
            let mut store = open_store(&cfg)?;
            plot::plot_to_path(&mut store, &output).map(|_| ())
        }
        Command::Configure { action } => {
            let mut store = open_store(&cfg)?;
            configure(&mut store, action)
        }
    }
}

fn configure(store: &mut Store, action: ConfigureAction) -> Result<(), String> {
    match action {
        ConfigureAction::AddGrouping { name, short_name } => {
            let id = store
                .create_grouping(&name, short_name.as_deref())
                .map_err(|e| format!("creating grouping failed: {}", e))?;
            info!("Created grouping {} ({})", id, name);
            println!("{}", id);
            Ok(())
        }
        ConfigureAction::Sensor {
            sensor_id,
            name,
            short_name,
            grouping,
            role,
            active,
            calibration,
        } => {
            let update = SensorUpdate {
                pretty_name: name,
                short_name,
                grouping_id: grouping,
                role: role.map(SensorRole::from),
                active,
                calibration_correction: calibration,
            };
            match store.configure_sensor(&sensor_id, &update) {
                Ok(true) => {
                    info!("Updated sensor {}", sensor_id);
                    Ok(())
                }
                Ok(false) => Err(format!("no sensor registered with id {}", sensor_id)),
                Err(e) => Err(format!("updating sensor {} failed: {}", sensor_id, e)),
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let loaded_env = match load_env_file(cli.env_file.as_deref()) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "radiator-logger {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli.command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
