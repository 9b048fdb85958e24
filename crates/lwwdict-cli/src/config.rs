//! Configuration file and setting resolution
//!
//! Precedence: command-line flag or environment variable, then the TOML
//! config file, then built-in defaults.
//!
//! ```toml
//! db = "/var/lib/lwwdict/replicas.db"
//! log_level = "info"
//! format = "json"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use tracing::Level;

pub const DEFAULT_DB: &str = "lwwdict.db";
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Snapshot encoding for export and import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    #[default]
    Json,
    Msgpack,
}

impl SnapshotFormat {
    /// Guess from a file extension; anything but `.json` is MessagePack
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SnapshotFormat::Json,
            _ => SnapshotFormat::Msgpack,
        }
    }
}

/// Contents of the optional config file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub db: Option<PathBuf>,
    pub log_level: Option<String>,
    pub format: Option<SnapshotFormat>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }
}

/// Effective settings after precedence is applied
#[derive(Debug, Clone)]
pub struct Settings {
    pub db: PathBuf,
    pub log_level: Level,
    pub format: SnapshotFormat,
}

impl Settings {
    pub fn resolve(
        db: Option<PathBuf>,
        log_level: Option<String>,
        format: Option<SnapshotFormat>,
        config: Config,
    ) -> Self {
        let level = log_level
            .or(config.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Self {
            db: db.or(config.db).unwrap_or_else(|| PathBuf::from(DEFAULT_DB)),
            log_level: parse_level(&level),
            format: format.or(config.format).unwrap_or_default(),
        }
    }
}

/// Parse a log level name, falling back to INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
