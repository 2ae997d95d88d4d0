// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Turnstile write queue.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};
use turnstile_core::ShutdownPolicy;

/// Top-level Turnstile configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TurnstileConfig {
    /// SQLite store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Write queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// SQLite store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// How long SQLite waits on a locked database before returning SQLITE_BUSY.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Enforce foreign key constraints.
    #[serde(default = "default_true")]
    pub foreign_keys: bool,

    /// `PRAGMA synchronous` level.
    #[serde(default)]
    pub synchronous: SynchronousMode,

    /// Run `PRAGMA wal_checkpoint(TRUNCATE)` before closing the store.
    #[serde(default = "default_true")]
    pub checkpoint_on_close: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
            busy_timeout_ms: default_busy_timeout_ms(),
            foreign_keys: true,
            synchronous: SynchronousMode::default(),
            checkpoint_on_close: true,
        }
    }
}

fn default_database_path() -> String {
    "turnstile.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

/// SQLite `PRAGMA synchronous` setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynchronousMode {
    Off,
    #[default]
    Normal,
    Full,
    Extra,
}

impl SynchronousMode {
    /// The keyword SQLite expects on the right-hand side of the PRAGMA.
    pub fn as_pragma(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
            Self::Extra => "EXTRA",
        }
    }
}

/// Write queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Number of requests the admission queue holds before producers wait.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// What to do with admitted-but-unexecuted requests on stop.
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,

    /// Name given to the writer thread.
    #[serde(default = "default_worker_thread_name")]
    pub worker_thread_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            shutdown_policy: ShutdownPolicy::default(),
            worker_thread_name: default_worker_thread_name(),
        }
    }
}

fn default_capacity() -> usize {
    100
}

fn default_worker_thread_name() -> String {
    "turnstile-writer".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
