// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! A [`Database`] is the one read-write handle to a SQLite file. It is moved
//! into the write queue's worker thread and handed back on shutdown; do NOT
//! open additional connections for writes.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, warn};

use turnstile_config::model::StorageConfig;
use turnstile_core::{HealthStatus, TurnstileError};

const IN_MEMORY_PATH: &str = ":memory:";

/// A live, health-checked SQLite connection.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
    path: String,
    checkpoint_on_close: bool,
}

impl Database {
    /// Open the database described by `config`.
    ///
    /// Creates missing parent directories, applies the configured PRAGMAs and
    /// pings the connection before returning it.
    pub fn open(config: &StorageConfig) -> Result<Self, TurnstileError> {
        let path = config.database_path.clone();
        let connect_err = |source: Box<dyn std::error::Error + Send + Sync>| {
            TurnstileError::Connection {
                path: path.clone(),
                source,
            }
        };

        if let Some(parent) = Path::new(&path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| connect_err(Box::new(e)))?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI,
        )
        .map_err(|e| connect_err(Box::new(e)))?;

        apply_pragmas(&conn, config).map_err(|e| connect_err(Box::new(e)))?;

        let db = Self {
            conn,
            path: path.clone(),
            checkpoint_on_close: config.wal_mode && config.checkpoint_on_close,
        };
        db.ping().map_err(|e| connect_err(Box::new(e)))?;

        info!(path = %db.path, wal = config.wal_mode, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database. Used by tests and tooling.
    pub fn open_in_memory() -> Result<Self, TurnstileError> {
        let conn = Connection::open_in_memory().map_err(|e| TurnstileError::Connection {
            path: IN_MEMORY_PATH.to_string(),
            source: Box::new(e),
        })?;
        let db = Self {
            conn,
            path: IN_MEMORY_PATH.to_string(),
            checkpoint_on_close: false,
        };
        db.ping().map_err(|e| TurnstileError::Connection {
            path: IN_MEMORY_PATH.to_string(),
            source: Box::new(e),
        })?;
        Ok(db)
    }

    /// Path the database was opened from (`:memory:` for in-memory stores).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Shared access to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Exclusive access to the underlying connection (transactions need `&mut`).
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Cheap liveness check.
    pub fn health_check(&self) -> HealthStatus {
        match self.ping() {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        }
    }

    /// Run `PRAGMA integrity_check` and report anything other than `ok`.
    pub fn integrity_check(&self) -> Result<HealthStatus, TurnstileError> {
        let mut stmt = self.conn.prepare("PRAGMA integrity_check")?;
        let problems = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        if problems.len() == 1 && problems[0] == "ok" {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy(problems.join("; ")))
        }
    }

    /// Current `journal_mode`, lowercased (`wal`, `delete`, `memory`, ...).
    pub fn journal_mode(&self) -> Result<String, TurnstileError> {
        let mode: String = self
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        Ok(mode.to_ascii_lowercase())
    }

    /// Checkpoint the WAL (if configured) and close the connection.
    pub fn close(self) -> Result<(), TurnstileError> {
        if self.checkpoint_on_close {
            // A failed checkpoint leaves the WAL in place; SQLite replays it on
            // next open, so only the close itself is fatal.
            match self
                .conn
                .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            {
                Ok(()) => debug!(path = %self.path, "WAL checkpoint complete"),
                Err(e) => warn!(path = %self.path, error = %e, "WAL checkpoint failed"),
            }
        }

        let path = self.path;
        self.conn
            .close()
            .map_err(|(_conn, e)| TurnstileError::Close {
                source: Box::new(e),
            })?;
        debug!(path = %path, "database closed");
        Ok(())
    }

    fn ping(&self) -> Result<(), rusqlite::Error> {
        self.conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

fn apply_pragmas(conn: &Connection, config: &StorageConfig) -> Result<(), rusqlite::Error> {
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

    if config.wal_mode {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!(mode = %mode, "SQLite refused WAL mode");
        }
    }

    conn.pragma_update(None, "synchronous", config.synchronous.as_pragma())?;
    conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;
    Ok(())
}
