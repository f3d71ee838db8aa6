//! Courier configuration.
//!
//! Loaded from `~/.courier/config.toml`. Every key is optional; a missing
//! file yields the defaults.
//!
//! ```toml
//! storage-root = "/var/lib/courier"
//!
//! [location]
//! interval-ms = 4000
//!
//! [navigation]
//! advance-radius-m = 25.0
//!
//! [completion]
//! cash-policy = "flag-for-review"
//!
//! [backend]
//! base-url = "https://dispatch.example.com/api"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config at {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

/// Courier configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Overrides the local snapshot directory (`~/.courier/sessions`).
    pub storage_root: Option<PathBuf>,
    pub location: LocationConfig,
    pub navigation: NavigationConfig,
    pub completion: CompletionConfig,
    pub backend: BackendConfig,
}

/// Position sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LocationConfig {
    /// Minimum spacing between accepted samples. Staleness is twice this.
    pub interval_ms: u64,
    /// Samples kept for speed and heading smoothing.
    pub buffer_size: usize,
    /// Samples with a worse accuracy radius do not advance navigation.
    pub accuracy_threshold_m: f64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            interval_ms: 4000,
            buffer_size: 5,
            accuracy_threshold_m: 50.0,
        }
    }
}

/// Instruction advancement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NavigationConfig {
    /// How close to the next instruction's point counts as reaching it.
    pub advance_radius_m: f64,
    /// How far the distance to the current instruction must grow before it
    /// counts as receding.
    pub hysteresis_m: f64,
    /// How close to a stop marks it arrived.
    pub arrival_radius_m: f64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            advance_radius_m: 25.0,
            hysteresis_m: 2.0,
            arrival_radius_m: 40.0,
        }
    }
}

/// What to do when collected cash differs from the expected amount.
///
/// Either way the amount is accepted; partial payment is a valid outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CashPolicy {
    Accept,
    #[default]
    FlagForReview,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CompletionConfig {
    pub cash_policy: CashPolicy,
    /// Differences at or below this are not mismatches.
    pub cash_tolerance: f64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            cash_policy: CashPolicy::FlagForReview,
            cash_tolerance: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BackendConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_secs: 15,
        }
    }
}

impl Config {
    /// Load config from `~/.courier/config.toml`, or defaults if absent.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load config from an explicit path, or defaults if the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;

        Ok(config)
    }

    /// The config file path: `~/.courier/config.toml`.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".courier").join("config.toml"))
    }

    fn validate(&self) -> Result<(), String> {
        if self.location.interval_ms == 0 {
            return Err("location.interval-ms must be greater than zero".into());
        }
        if self.location.buffer_size < 2 {
            return Err("location.buffer-size must be at least 2".into());
        }
        if self.navigation.advance_radius_m <= 0.0 || self.navigation.arrival_radius_m <= 0.0 {
            return Err("navigation radii must be positive".into());
        }
        if self.navigation.hysteresis_m < 0.0 || self.completion.cash_tolerance < 0.0 {
            return Err("hysteresis and cash tolerance cannot be negative".into());
        }
        Ok(())
    }
}
