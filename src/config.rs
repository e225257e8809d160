//! Configuration module for NanoStatus.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::live::{DEFAULT_DEBOUNCE_WINDOW, DEFAULT_OBSERVER_BUFFER};
use crate::probe::DEFAULT_PROBE_TIMEOUT;
use crate::scheduler::{DEFAULT_PROBE_DELAY, DEFAULT_RETENTION_DAYS, DEFAULT_SWEEP_INTERVAL};

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "nanostatus.db")
    pub db_path: String,
    /// Time between full sweeps (default: 60s)
    pub sweep_interval: Duration,
    /// Pause between two probes of a sweep (default: 500ms)
    pub probe_delay: Duration,
    /// Hard timeout of one probe (default: 10s)
    pub probe_timeout: Duration,
    /// Quiescence window before stats are recomputed (default: 500ms)
    pub debounce_window: Duration,
    /// Messages an observer may have queued before drops start (default: 256)
    pub observer_buffer: usize,
    /// Age in days after which check history is deleted (default: 365)
    pub retention_days: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "nanostatus.db".to_string(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            probe_delay: DEFAULT_PROBE_DELAY,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            observer_buffer: DEFAULT_OBSERVER_BUFFER,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `NANOSTATUS_HTTP_PORT`: HTTP port
    /// - `NANOSTATUS_DB_PATH`: Database file path
    /// - `NANOSTATUS_SWEEP_INTERVAL_SECS`: Seconds between sweeps
    /// - `NANOSTATUS_PROBE_DELAY_MS`: Milliseconds between probes of a sweep
    /// - `NANOSTATUS_PROBE_TIMEOUT_SECS`: Probe timeout in seconds
    /// - `NANOSTATUS_DEBOUNCE_MS`: Stats debounce window in milliseconds
    /// - `NANOSTATUS_OBSERVER_BUFFER`: Per-observer queue length
    /// - `NANOSTATUS_RETENTION_DAYS`: Check history retention in days
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = parse_var(&lookup, "NANOSTATUS_HTTP_PORT")? {
            cfg.http_port = port;
        }
        if let Some(db_path) = lookup("NANOSTATUS_DB_PATH") {
            cfg.db_path = db_path;
        }
        if let Some(secs) = parse_positive(&lookup, "NANOSTATUS_SWEEP_INTERVAL_SECS")? {
            cfg.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "NANOSTATUS_PROBE_DELAY_MS")? {
            cfg.probe_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_positive(&lookup, "NANOSTATUS_PROBE_TIMEOUT_SECS")? {
            cfg.probe_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_positive(&lookup, "NANOSTATUS_DEBOUNCE_MS")? {
            cfg.debounce_window = Duration::from_millis(ms);
        }
        if let Some(size) = parse_positive(&lookup, "NANOSTATUS_OBSERVER_BUFFER")? {
            cfg.observer_buffer = size as usize;
        }
        if let Some(days) = parse_positive(&lookup, "NANOSTATUS_RETENTION_DAYS")? {
            cfg.retention_days = days as i64;
        }

        Ok(cfg)
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            }),
    }
}

fn parse_positive<F>(lookup: &F, name: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_var::<u64, F>(lookup, name)? {
        Some(0) => Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        other => Ok(other),
    }
}
