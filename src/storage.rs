//! Local persistence for driver sessions.
//!
//! Each driver's last snapshot lives in its own `SQLite` file under the
//! storage root:
//!
//! ```text
//! <root>/<driver-id>.sqlite
//!   driver   # one row: identity and online status
//!   route    # zero or one row: route header and stop cursor
//!   stops    # the route's stops, in order
//! ```
//!
//! Delivery proof is never written here.

mod snapshot;

use std::{fs, io, path::PathBuf};

use rusqlite::Connection;
use uuid::Uuid;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no snapshot for driver: {0}")]
    NotFound(Uuid),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

pub type Result<T> = core::result::Result<T, StorageError>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS driver (
        id            TEXT PRIMARY KEY,
        name          TEXT NOT NULL,
        vehicle_type  TEXT NOT NULL,
        license_plate TEXT NOT NULL,
        online_status TEXT NOT NULL,
        saved_at      TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS route (
        id                 TEXT PRIMARY KEY,
        name               TEXT NOT NULL,
        status             TEXT NOT NULL,
        total_distance_m   REAL NOT NULL,
        estimated_time_s   INTEGER NOT NULL,
        optimization_score REAL,
        current_stop_index INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS stops (
        id                 TEXT PRIMARY KEY,
        position           INTEGER NOT NULL,
        tracking_number    TEXT NOT NULL,
        address            TEXT NOT NULL,
        lat                REAL NOT NULL,
        lng                REAL NOT NULL,
        notes              TEXT,
        items              TEXT NOT NULL,
        status             TEXT NOT NULL,
        failure_reason     TEXT,
        requires_signature INTEGER NOT NULL,
        cash_on_delivery   REAL
    );
";

/// Local `SQLite`-backed storage for session snapshots.
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Creates a new storage instance rooted at the given directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Returns the default storage root: `~/.courier/sessions/`.
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".courier").join("sessions"))
    }

    fn db_path(&self, driver_id: Uuid) -> PathBuf {
        self.root.join(format!("{driver_id}.sqlite"))
    }

    /// Opens (creating if needed) a driver's database with the schema applied.
    fn create_db(&self, driver_id: Uuid) -> Result<Connection> {
        let conn = Connection::open(self.db_path(driver_id))?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    /// Opens an existing driver's database.
    fn open_db(&self, driver_id: Uuid) -> Result<Connection> {
        let path = self.db_path(driver_id);
        if !path.exists() {
            return Err(StorageError::NotFound(driver_id));
        }
        Ok(Connection::open(path)?)
    }
}
