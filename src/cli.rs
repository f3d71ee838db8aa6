//! CLI interface for Courier.
//!
//! Every subcommand is non-interactive: files in, human-readable lines out.
//!
//! - `courier route show <route.json>` prints a route and its stops.
//! - `courier replay <route.json> --trace <trace.jsonl>` drives a full session
//!   headlessly from a recorded GPS trace.
//! - `courier fetch --driver <id>` lists the routes the backend has assigned.
//! - `courier snapshot show|clear --driver <id>` inspects the local snapshot.

mod format;
mod replay;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use uuid::Uuid;

use courier::backend::{DispatchBackend, HttpBackend};
use courier::config::Config;
use courier::directions::StaticDirections;
use courier::model::{LocationSample, Route};
use courier::storage::{Storage, StorageError};

use format::{format_driver, format_route};

/// Courier: run a delivery route from the command line.
#[derive(Debug, Parser)]
#[command(name = "courier", after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r#"Workflow: rehearsing a route
  1. courier route show morning.json
  2. courier replay morning.json --trace drive.jsonl --legs legs.json --save
     → prints a driver ID
  3. courier snapshot show --driver 5f0c...

Trace files hold one location sample per line:
  {"lat": 52.52, "lng": 13.40, "timestamp": "2026-10-15T08:00:00Z", "accuracy_m": 6.0}"#;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect route files.
    Route {
        #[command(subcommand)]
        command: RouteCommand,
    },

    /// Drive a route from a recorded GPS trace.
    ///
    /// Starts the route, feeds every sample through the location tracker
    /// and navigation engine, and completes each stop on arrival against a
    /// local backend that acknowledges everything.
    Replay {
        /// Route JSON file.
        route: PathBuf,

        /// Location samples, one JSON object per line.
        #[arg(long)]
        trace: PathBuf,

        /// Legs JSON: an object mapping stop id to leg.
        #[arg(long)]
        legs: Option<PathBuf>,

        /// Save the final session snapshot to local storage.
        #[arg(long)]
        save: bool,
    },

    /// List routes assigned to a driver by the dispatch backend.
    Fetch {
        #[arg(long)]
        driver: Uuid,
    },

    /// Inspect or remove a driver's locally preserved session.
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum RouteCommand {
    /// Print a route's stops and their statuses.
    Show { route: PathBuf },
}

#[derive(Debug, Subcommand)]
pub enum SnapshotCommand {
    Show {
        #[arg(long)]
        driver: Uuid,
    },

    /// Remove the snapshot. Succeeds if there is none.
    Clear {
        #[arg(long)]
        driver: Uuid,
    },
}

pub fn run(config: &Config, storage: &Storage) -> Result<(), String> {
    let cli = Cli::parse();

    match cli.command {
        Command::Route {
            command: RouteCommand::Show { route },
        } => {
            let route = read_route(&route)?;
            print!("{}", format_route(&route, None));
            Ok(())
        }
        Command::Replay {
            route,
            trace,
            legs,
            save,
        } => cmd_replay(config, storage, &route, &trace, legs.as_deref(), save),
        Command::Fetch { driver } => cmd_fetch(config, driver),
        Command::Snapshot { command } => match command {
            SnapshotCommand::Show { driver } => cmd_snapshot_show(storage, driver),
            SnapshotCommand::Clear { driver } => storage
                .clear_snapshot(driver)
                .map_err(|e| format!("failed to clear snapshot: {e}")),
        },
    }
}

fn cmd_replay(
    config: &Config,
    storage: &Storage,
    route: &Path,
    trace: &Path,
    legs: Option<&Path>,
    save: bool,
) -> Result<(), String> {
    let route = read_route(route)?;
    let trace = read_trace(trace)?;
    let directions = match legs {
        Some(path) => StaticDirections::from_file(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?,
        None => StaticDirections::default(),
    };

    let snapshot = replay::replay(config, route, &trace, directions)?;
    if save {
        storage
            .save_snapshot(&snapshot)
            .map_err(|e| format!("failed to save snapshot: {e}"))?;
        println!("{}", snapshot.driver.id);
    }
    Ok(())
}

fn cmd_fetch(config: &Config, driver: Uuid) -> Result<(), String> {
    let mut backend = HttpBackend::new(&config.backend).map_err(|e| e.to_string())?;
    let routes = backend
        .fetch_assigned_routes(driver)
        .map_err(|e| format!("failed to fetch routes: {e}"))?;

    if routes.is_empty() {
        println!("No routes assigned");
        return Ok(());
    }
    for route in &routes {
        print!("{}", format_route(route, None));
    }
    Ok(())
}

fn cmd_snapshot_show(storage: &Storage, driver: Uuid) -> Result<(), String> {
    let snapshot = match storage.load_snapshot(driver) {
        Ok(s) => s,
        Err(StorageError::NotFound(_)) => {
            println!("No snapshot for {driver}");
            return Ok(());
        }
        Err(e) => return Err(format!("failed to load snapshot: {e}")),
    };

    println!("{}", format_driver(&snapshot.driver));
    println!("saved {}", snapshot.saved_at);
    match &snapshot.route {
        Some(route) => print!("{}", format_route(route, Some(snapshot.current_stop_index))),
        None => println!("No route"),
    }
    Ok(())
}

fn read_route(path: &Path) -> Result<Route, String> {
    let json =
        fs::read_to_string(path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&json).map_err(|e| format!("invalid route {}: {e}", path.display()))
}

fn read_trace(path: &Path) -> Result<Vec<LocationSample>, String> {
    let text =
        fs::read_to_string(path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .map_err(|e| format!("{}:{}: invalid sample: {e}", path.display(), n + 1))
        })
        .collect()
}
