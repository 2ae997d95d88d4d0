// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end queue testing.
//!
//! `TestQueue` opens a WAL-mode SQLite file in a temp directory, installs a
//! small fixture schema, and starts a [`WriteQueue`] over it. Reads go
//! through a separate read-only connection, the same way production readers
//! bypass the queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{Connection, OpenFlags};
use tokio_util::sync::CancellationToken;
use turnstile_config::model::{QueueConfig, StorageConfig};
use turnstile_core::{ShutdownPolicy, TurnstileError};
use turnstile_queue::{WriteContext, WriteQueue};
use turnstile_storage::Database;

const FIXTURE_SCHEMA: &str = "
    CREATE TABLE counter (
        id    INTEGER PRIMARY KEY CHECK (id = 1),
        value INTEGER NOT NULL
    );
    INSERT INTO counter (id, value) VALUES (1, 0);
    CREATE TABLE events (
        seq INTEGER NOT NULL,
        tag TEXT NOT NULL
    );
";

/// Builder for creating test queues with configurable options.
pub struct TestQueueBuilder {
    capacity: usize,
    policy: ShutdownPolicy,
    start: bool,
    parent: Option<CancellationToken>,
}

impl TestQueueBuilder {
    fn new() -> Self {
        Self {
            capacity: 16,
            policy: ShutdownPolicy::Drain,
            start: true,
            parent: None,
        }
    }

    /// Set the admission queue capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set what happens to pending requests on stop.
    pub fn with_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Leave the queue in the `Created` state.
    pub fn unstarted(mut self) -> Self {
        self.start = false;
        self
    }

    /// Tie the queue's shutdown to `parent`, as a service token would.
    pub fn with_parent(mut self, parent: CancellationToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Create the temp database and the queue.
    pub fn build(self) -> Result<TestQueue, TurnstileError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| TurnstileError::Storage {
            source: Box::new(e),
        })?;
        let db_path = temp_dir.path().join("test.db");

        let storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            ..StorageConfig::default()
        };
        let mut db = Database::open(&storage)?;
        db.connection_mut().execute_batch(FIXTURE_SCHEMA)?;

        let config = QueueConfig {
            capacity: self.capacity,
            shutdown_policy: self.policy,
            ..QueueConfig::default()
        };
        let queue = Arc::new(match &self.parent {
            Some(parent) => WriteQueue::with_token(db, &config, parent),
            None => WriteQueue::new(db, &config),
        });
        if self.start {
            queue.start()?;
        }

        Ok(TestQueue {
            queue,
            db_path,
            _temp_dir: temp_dir,
        })
    }
}

/// A write queue over a temp database with the fixture schema.
pub struct TestQueue {
    /// The queue under test.
    pub queue: Arc<WriteQueue>,
    db_path: PathBuf,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestQueue {
    /// Create a new builder for configuring the test queue.
    pub fn builder() -> TestQueueBuilder {
        TestQueueBuilder::new()
    }

    /// Path of the temp database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Current counter value, read outside the queue.
    pub fn read_counter(&self) -> Result<i64, TurnstileError> {
        let conn = self.reader()?;
        Ok(conn.query_row("SELECT value FROM counter WHERE id = 1", [], |row| {
            row.get(0)
        })?)
    }

    /// Every recorded event as `(sequence, tag)`, in insertion order.
    pub fn read_events(&self) -> Result<Vec<(u64, String)>, TurnstileError> {
        let conn = self.reader()?;
        let mut stmt = conn.prepare("SELECT seq, tag FROM events ORDER BY rowid")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)? as u64, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn reader(&self) -> Result<Connection, TurnstileError> {
        Ok(Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?)
    }
}

/// Write operation that bumps the counter by one and returns the new value.
pub fn increment_counter()
-> impl FnOnce(&mut WriteContext<'_>) -> Result<i64, TurnstileError> + Send + 'static {
    |ctx: &mut WriteContext<'_>| {
        ctx.execute("UPDATE counter SET value = value + 1 WHERE id = 1", [])?;
        Ok(ctx
            .connection()
            .query_row("SELECT value FROM counter WHERE id = 1", [], |row| row.get(0))?)
    }
}

/// Write operation that appends `(sequence, tag)` to `events` and returns the sequence.
pub fn record_event(
    tag: impl Into<String>,
) -> impl FnOnce(&mut WriteContext<'_>) -> Result<u64, TurnstileError> + Send + 'static {
    let tag = tag.into();
    move |ctx: &mut WriteContext<'_>| {
        let sequence = ctx.sequence();
        ctx.execute(
            "INSERT INTO events (seq, tag) VALUES (?1, ?2)",
            rusqlite::params![sequence as i64, tag],
        )?;
        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Gate;

    #[tokio::test]
    async fn builder_creates_started_queue_with_fixture() {
        let harness = TestQueue::builder().build().unwrap();
        assert_eq!(harness.read_counter().unwrap(), 0);
        assert!(harness.read_events().unwrap().is_empty());
        harness.queue.stop().await.unwrap();
    }

    #[tokio::test]
    async fn increment_is_visible_to_readers() {
        let harness = TestQueue::builder().build().unwrap();
        let value = harness.queue.submit(increment_counter()).await.unwrap();
        assert_eq!(value, 1);
        assert_eq!(harness.read_counter().unwrap(), 1);
        harness.queue.stop().await.unwrap();
    }

    #[tokio::test]
    async fn record_event_stores_its_sequence() {
        let harness = TestQueue::builder().build().unwrap();
        harness.queue.submit(record_event("first")).await.unwrap();
        harness.queue.submit(record_event("second")).await.unwrap();
        assert_eq!(
            harness.read_events().unwrap(),
            vec![(0, "first".to_string()), (1, "second".to_string())]
        );
        harness.queue.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gate_holds_the_writer_until_opened() {
        let harness = TestQueue::builder().build().unwrap();
        let (mut gate, op) = Gate::new();

        let queue = harness.queue.clone();
        let held = tokio::spawn(async move { queue.submit(op).await });
        assert_eq!(gate.entered().await, Some(0));
        assert_eq!(gate.entered().await, None);

        gate.open();
        assert_eq!(held.await.unwrap().unwrap(), 0);
        harness.queue.stop().await.unwrap();
    }
}
