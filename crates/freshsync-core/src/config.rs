//! Configuration module for Freshsync.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, defaults, and platform-appropriate paths.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Freshsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub dispatch: DispatchConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Rule scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether due rules actually produce jobs. When false the scheduler
    /// runs in dry-run mode: it evaluates rules and logs the jobs it would
    /// have created, for staged rollout.
    pub job_creation_enabled: bool,
    /// Seconds the loop pauses after a failed pass before continuing.
    pub error_pause_secs: u64,
    /// Hours a created job stays valid (`end_by` horizon, advisory).
    pub job_window_hours: u64,
}

/// Job dispatch / acquisition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Liveness lease in seconds: an Executing job not reported within
    /// this window is presumed dead and forced to failure.
    pub lease_secs: u64,
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/freshsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("freshsync")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

// Config derives Default because all its fields implement Default.

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            job_creation_enabled: true,
            error_pause_secs: 5,
            job_window_hours: 24,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { lease_secs: 120 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("freshsync")
                .join("freshsync.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
