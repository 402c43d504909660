//! TOML configuration loaded from `~/.weekcast/config.toml`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WeekcastError};

/// Shown when both pools are exhausted for a tenant.
pub const DEFAULT_FALLBACK_URL: &str =
    "https://i.kym-cdn.com/photos/images/original/001/091/264/665.jpg";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekcastConfig {
    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Seconds between scheduler cycles.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// URL delivered when a tenant's pools are exhausted.
    #[serde(default = "default_fallback_url")]
    pub fallback_url: String,
}

fn default_db_path() -> String {
    "~/.weekcast/weekcast.db".to_string()
}

fn default_tick_interval() -> u64 {
    60
}

fn default_fallback_url() -> String {
    DEFAULT_FALLBACK_URL.to_string()
}

impl Default for WeekcastConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            tick_interval_secs: default_tick_interval(),
            fallback_url: default_fallback_url(),
        }
    }
}

impl WeekcastConfig {
    /// Weekcast home directory (`~/.weekcast`).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".weekcast")
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Load from an explicit path, or the default location. A missing file
    /// yields the defaults; a malformed file is a hard error.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = match path {
            Some(p) => PathBuf::from(shellexpand::tilde(p).into_owned()),
            None => Self::default_path(),
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        toml::from_str(&raw)
            .map_err(|e| WeekcastError::config(format!("{}: {e}", path.display())))
    }

    /// `db_path` with `~` expanded.
    pub fn database_file(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).into_owned())
    }
}
