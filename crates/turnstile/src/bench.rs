// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `turnstile bench` command implementation.
//!
//! Spawns N concurrent writers that each increment one shared counter through
//! the write queue, then checks that no update was lost.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rusqlite::{Connection, OpenFlags};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use turnstile_config::model::TurnstileConfig;
use turnstile_core::TurnstileError;
use turnstile_queue::{WriteContext, WriteQueue};
use turnstile_storage::Database;

const BENCH_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS turnstile_bench (
        id    INTEGER PRIMARY KEY CHECK (id = 1),
        value INTEGER NOT NULL
    );
    INSERT INTO turnstile_bench (id, value) VALUES (1, 0)
        ON CONFLICT (id) DO UPDATE SET value = 0;
";

/// What a bench run observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchReport {
    /// Writers spawned.
    pub writers: usize,
    /// Increments that completed successfully.
    pub completed: usize,
    /// Increments refused or abandoned because shutdown began.
    pub rejected: usize,
    /// Increments that failed for any other reason.
    pub failed: usize,
    /// Counter value read back after the queue stopped.
    pub counter: i64,
    /// Wall time from the first submission to the last result.
    pub elapsed: Duration,
}

impl BenchReport {
    /// True when every completed increment is reflected in the counter.
    pub fn is_consistent(&self) -> bool {
        self.counter == self.completed as i64
    }
}

/// Run the `turnstile bench` command.
///
/// With `metrics`, installs the Prometheus recorder and prints the rendered
/// metrics after the run.
pub async fn run_bench(
    config: &TurnstileConfig,
    writers: usize,
    capacity: Option<usize>,
    metrics: bool,
) -> Result<(), TurnstileError> {
    #[cfg(feature = "prometheus")]
    let handle = if metrics {
        Some(install_metrics()?)
    } else {
        None
    };
    #[cfg(not(feature = "prometheus"))]
    if metrics {
        warn!("built without the prometheus feature; --metrics ignored");
    }

    let cancel = crate::shutdown::install_signal_handler();
    let report = bench(config, writers, capacity, &cancel).await?;

    println!();
    println!("  turnstile bench");
    println!("  {}", "-".repeat(50));
    println!("    {:<12} {}", "writers", report.writers);
    println!("    {:<12} {}", "completed", report.completed);
    println!("    {:<12} {}", "rejected", report.rejected);
    println!("    {:<12} {}", "failed", report.failed);
    println!("    {:<12} {}", "counter", report.counter);
    println!("    {:<12} {:.1?}", "elapsed", report.elapsed);
    let secs = report.elapsed.as_secs_f64();
    if secs > 0.0 {
        println!("    {:<12} {:.0}", "writes/sec", report.completed as f64 / secs);
    }
    println!();

    #[cfg(feature = "prometheus")]
    if let Some(handle) = handle {
        println!("{}", handle.render());
    }

    if report.is_consistent() {
        Ok(())
    } else {
        Err(TurnstileError::Internal(format!(
            "lost updates: {} increments completed but counter is {}",
            report.completed, report.counter
        )))
    }
}

/// Run the increment scenario against the configured database.
pub async fn bench(
    config: &TurnstileConfig,
    writers: usize,
    capacity: Option<usize>,
    parent: &CancellationToken,
) -> Result<BenchReport, TurnstileError> {
    let mut queue_config = config.queue.clone();
    if let Some(capacity) = capacity {
        queue_config.capacity = capacity;
    }

    let db = Database::open(&config.storage)?;
    let queue = Arc::new(WriteQueue::with_token(db, &queue_config, parent));
    queue.start()?;

    let prepared = queue
        .submit(|ctx: &mut WriteContext<'_>| {
            ctx.execute_batch(BENCH_SCHEMA).map_err(TurnstileError::from)
        })
        .await;
    if let Err(e) = prepared {
        if let Err(close) = queue.stop().await {
            warn!(error = %close, "failed to stop queue after setup error");
        }
        return Err(e);
    }

    info!(writers, capacity = queue.capacity(), "bench started");
    let started = Instant::now();

    let mut tasks = JoinSet::new();
    for _ in 0..writers {
        let queue = Arc::clone(&queue);
        tasks.spawn(async move { queue.submit(increment).await });
    }

    let mut report = BenchReport {
        writers,
        completed: 0,
        rejected: 0,
        failed: 0,
        counter: 0,
        elapsed: Duration::ZERO,
    };
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(_)) => report.completed += 1,
            Ok(Err(TurnstileError::ShuttingDown | TurnstileError::Abandoned { .. })) => {
                report.rejected += 1
            }
            Ok(Err(e)) => {
                warn!(error = %e, "increment failed");
                report.failed += 1;
            }
            Err(e) => {
                warn!(error = %e, "writer task failed");
                report.failed += 1;
            }
        }
    }
    report.elapsed = started.elapsed();

    queue.stop().await?;
    report.counter = read_counter(&config.storage.database_path)?;

    info!(
        completed = report.completed,
        counter = report.counter,
        "bench finished"
    );
    Ok(report)
}

fn increment(ctx: &mut WriteContext<'_>) -> Result<i64, TurnstileError> {
    ctx.execute(
        "UPDATE turnstile_bench SET value = value + 1 WHERE id = 1",
        [],
    )?;
    Ok(ctx
        .connection()
        .query_row("SELECT value FROM turnstile_bench WHERE id = 1", [], |row| row.get(0))?)
}

fn read_counter(path: &str) -> Result<i64, TurnstileError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    Ok(conn.query_row("SELECT value FROM turnstile_bench WHERE id = 1", [], |row| {
        row.get(0)
    })?)
}

#[cfg(feature = "prometheus")]
fn install_metrics() -> Result<metrics_exporter_prometheus::PrometheusHandle, TurnstileError> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| {
            TurnstileError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;
    turnstile_queue::register_metrics();
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_in(dir: &std::path::Path) -> TurnstileConfig {
        let mut config = TurnstileConfig::default();
        config.storage.database_path = dir.join("bench.db").to_string_lossy().to_string();
        config
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bench_loses_no_updates() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());

        let report = bench(&config, 100, Some(4), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.completed, 100);
        assert_eq!(report.counter, 100);
        assert!(report.is_consistent());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rerun_resets_the_counter() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let token = CancellationToken::new();

        bench(&config, 10, None, &token).await.unwrap();
        let report = bench(&config, 5, None, &token).await.unwrap();
        assert_eq!(report.counter, 5);
    }

    #[tokio::test]
    async fn cancelled_parent_refuses_to_start_writing() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let token = CancellationToken::new();
        token.cancel();

        let err = bench(&config, 5, None, &token).await.unwrap_err();
        assert!(matches!(err, TurnstileError::ShuttingDown), "got {err:?}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_mid_run_settles_every_writer() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            bench(&config, 20_000, Some(4), &token),
        )
        .await
        .expect("bench should finish after cancellation");

        match result {
            Ok(report) => {
                assert_eq!(report.completed + report.rejected + report.failed, 20_000);
                assert_eq!(report.failed, 0);
                assert!(report.is_consistent(), "{report:?}");
            }
            // Cancelled before the schema write ran.
            Err(err) => assert!(matches!(err, TurnstileError::ShuttingDown), "got {err:?}"),
        }
    }
}
