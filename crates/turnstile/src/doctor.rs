// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `turnstile doctor` command implementation.
//!
//! Runs diagnostic checks against the configured database: that it opens,
//! what journal mode it is in, whether it passes `PRAGMA integrity_check`,
//! and whether a write can be pushed through a write queue.

use std::io::IsTerminal;
use std::path::Path;
use std::time::{Duration, Instant};

use turnstile_config::model::{QueueConfig, StorageConfig, TurnstileConfig};
use turnstile_core::{HealthStatus, TurnstileError};
use turnstile_queue::{WriteContext, WriteQueue};
use turnstile_storage::Database;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `turnstile doctor` command.
///
/// With `plain`, disables colored output. Returns an error if any check failed.
pub async fn run_doctor(
    config: &TurnstileConfig,
    config_path: Option<&Path>,
    plain: bool,
) -> Result<(), TurnstileError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let results = collect_checks(config, config_path).await;

    println!();
    println!("  turnstile doctor");
    println!("  {}", "-".repeat(50));

    let mut fail_count = 0;
    let mut warn_count = 0;
    for result in &results {
        match result.status {
            CheckStatus::Pass => {}
            CheckStatus::Warn => warn_count += 1,
            CheckStatus::Fail => fail_count += 1,
        }
        println!("{}", format_line(result, use_color));
    }

    println!();
    if fail_count > 0 || warn_count > 0 {
        let issues = fail_count + warn_count;
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();

    if fail_count > 0 {
        return Err(TurnstileError::Internal(format!(
            "{fail_count} doctor check(s) failed"
        )));
    }
    Ok(())
}

/// Run every check in order. Database checks are skipped if it cannot be opened.
pub async fn collect_checks(config: &TurnstileConfig, config_path: Option<&Path>) -> Vec<CheckResult> {
    let mut results = vec![check_config(config_path).await];

    let (result, db) = check_database(&config.storage).await;
    results.push(result);

    if let Some(db) = db {
        results.push(check_journal_mode(&db, config.storage.wal_mode).await);
        results.push(check_integrity(&db).await);
        results.push(check_write_path(db, &config.queue).await);
    }

    results.push(check_memory_baseline().await);
    results
}

fn format_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green().to_string(), result.message.normal().to_string()),
            CheckStatus::Warn => ("!".yellow().to_string(), result.message.yellow().to_string()),
            CheckStatus::Fail => ("✗".red().to_string(), result.message.red().to_string()),
        };
        format!("    {symbol} {:<20} {message} ({duration_ms}ms)", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!(
            "    {tag} {:<20} {} ({duration_ms}ms)",
            result.name, result.message
        )
    }
}

/// Check configuration loads without errors.
async fn check_config(path: Option<&Path>) -> CheckResult {
    let start = Instant::now();
    let loaded = match path {
        Some(path) => turnstile_config::load_and_validate_path(path),
        None => turnstile_config::load_and_validate(),
    };
    match loaded {
        Ok(_) => CheckResult::new("Configuration", CheckStatus::Pass, "valid", start),
        Err(errors) => CheckResult::new(
            "Configuration",
            CheckStatus::Fail,
            format!("{} error(s)", errors.len()),
            start,
        ),
    }
}

/// Check the database file exists, opens with the configured PRAGMAs and answers a ping.
async fn check_database(storage: &StorageConfig) -> (CheckResult, Option<Database>) {
    let start = Instant::now();
    let db_path = &storage.database_path;

    if !Path::new(db_path).exists() {
        let result = CheckResult::new(
            "Database",
            CheckStatus::Warn,
            format!("not found: {db_path} (will be created on first open)"),
            start,
        );
        return (result, None);
    }

    match Database::open(storage) {
        Ok(db) => match db.health_check() {
            HealthStatus::Healthy => (
                CheckResult::new("Database", CheckStatus::Pass, "connected", start),
                Some(db),
            ),
            HealthStatus::Degraded(reason) => (
                CheckResult::new("Database", CheckStatus::Warn, reason, start),
                Some(db),
            ),
            HealthStatus::Unhealthy(reason) => {
                (CheckResult::new("Database", CheckStatus::Fail, reason, start), None)
            }
        },
        Err(e) => (
            CheckResult::new("Database", CheckStatus::Fail, format!("open failed: {e}"), start),
            None,
        ),
    }
}

async fn check_journal_mode(db: &Database, expect_wal: bool) -> CheckResult {
    let start = Instant::now();
    match db.journal_mode() {
        Ok(mode) if !expect_wal || mode == "wal" => {
            CheckResult::new("Journal mode", CheckStatus::Pass, mode, start)
        }
        Ok(mode) => CheckResult::new(
            "Journal mode",
            CheckStatus::Warn,
            format!("{mode} (WAL requested)"),
            start,
        ),
        Err(e) => CheckResult::new("Journal mode", CheckStatus::Fail, e.to_string(), start),
    }
}

async fn check_integrity(db: &Database) -> CheckResult {
    let start = Instant::now();
    match db.integrity_check() {
        Ok(HealthStatus::Healthy) => CheckResult::new("DB integrity", CheckStatus::Pass, "ok", start),
        Ok(HealthStatus::Degraded(reason)) => {
            CheckResult::new("DB integrity", CheckStatus::Warn, reason, start)
        }
        Ok(HealthStatus::Unhealthy(reason)) => {
            CheckResult::new("DB integrity", CheckStatus::Fail, reason, start)
        }
        Err(e) => CheckResult::new("DB integrity", CheckStatus::Fail, e.to_string(), start),
    }
}

/// Push one rolled-back write through a fresh queue, then stop it.
async fn check_write_path(db: Database, queue_config: &QueueConfig) -> CheckResult {
    let start = Instant::now();
    let queue = WriteQueue::new(db, queue_config);
    if let Err(e) = queue.start() {
        return CheckResult::new("Write path", CheckStatus::Fail, e.to_string(), start);
    }

    let written = queue
        .submit(|ctx: &mut WriteContext<'_>| {
            let tx = ctx.transaction()?;
            tx.execute_batch(
                "CREATE TABLE turnstile_doctor_check (x INTEGER);
                 DROP TABLE turnstile_doctor_check;",
            )?;
            // Dropped without commit: nothing is left behind.
            Ok::<_, TurnstileError>(())
        })
        .await;
    let stopped = queue.stop().await;

    match (written, stopped) {
        (Ok(()), Ok(())) => {
            CheckResult::new("Write path", CheckStatus::Pass, "write lock acquired", start)
        }
        (Err(e), _) => CheckResult::new("Write path", CheckStatus::Fail, e.to_string(), start),
        (Ok(()), Err(e)) => CheckResult::new(
            "Write path",
            CheckStatus::Warn,
            format!("close failed: {e}"),
            start,
        ),
    }
}

/// Memory baseline via jemalloc.
async fn check_memory_baseline() -> CheckResult {
    let start = Instant::now();

    #[cfg(not(target_env = "msvc"))]
    {
        let _ = tikv_jemalloc_ctl::epoch::advance();
        let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
        let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
        let allocated_mb = allocated as f64 / (1024.0 * 1024.0);
        let resident_mb = resident as f64 / (1024.0 * 1024.0);

        CheckResult::new(
            "Memory baseline",
            CheckStatus::Pass,
            format!("heap: {allocated_mb:.1} MB, resident: {resident_mb:.1} MB"),
            start,
        )
    }

    #[cfg(target_env = "msvc")]
    {
        CheckResult::new(
            "Memory baseline",
            CheckStatus::Warn,
            "jemalloc not available on MSVC",
            start,
        )
    }
}
