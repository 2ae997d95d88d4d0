// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The single writer.
//!
//! A [`Worker`] owns the database handle and the receiving half of the
//! admission queue. It runs on one dedicated OS thread, so at most one write
//! touches the store at any instant and writes execute in admission order.

use std::time::Instant;

use futures::executor::block_on;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use turnstile_core::{ShutdownPolicy, TurnstileError};
use turnstile_storage::Database;

use crate::recording;
use crate::request::{Outcome, WriteContext, WriteRequest};

/// Counts of what happened to requests still queued at shutdown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DrainReport {
    pub executed: usize,
    pub abandoned: usize,
}

pub(crate) struct Worker {
    db: Database,
    rx: mpsc::Receiver<WriteRequest>,
    cancel: CancellationToken,
    policy: ShutdownPolicy,
    next_sequence: u64,
    /// Set once the admission queue has been closed and emptied.
    resolved: Option<DrainReport>,
}

impl Worker {
    pub(crate) fn new(
        db: Database,
        rx: mpsc::Receiver<WriteRequest>,
        cancel: CancellationToken,
        policy: ShutdownPolicy,
    ) -> Self {
        Self {
            db,
            rx,
            cancel,
            policy,
            next_sequence: 0,
            resolved: None,
        }
    }

    /// Execute requests until the cancellation token fires, then resolve
    /// everything still queued according to the shutdown policy.
    ///
    /// Callers whose requests were admitted get their result here, even when
    /// the token was cancelled through a parent and nobody calls `stop`.
    /// Returns `self` so the caller can close the database after joining.
    pub(crate) fn run(mut self) -> Self {
        debug!(db = %self.db.path(), "writer loop started");

        while let Some(request) = self.next_request() {
            self.execute(request);
        }

        debug!(executed = self.next_sequence, "writer loop exited");
        self.resolve_pending();
        self
    }

    /// Wait for the next request, preferring cancellation when both are ready.
    ///
    /// Returns `None` on cancellation, or if every sender is gone.
    fn next_request(&mut self) -> Option<WriteRequest> {
        let cancel = &self.cancel;
        let rx = &mut self.rx;
        block_on(async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                request = rx.recv() => request,
            }
        })
    }

    fn execute(&mut self, request: WriteRequest) -> Outcome {
        let sequence = self.take_sequence();
        let waited = request.enqueued_at().elapsed();
        recording::set_queue_depth(self.rx.len());

        let started = Instant::now();
        let mut ctx = WriteContext::new(self.db.connection_mut(), &self.cancel, sequence);
        let outcome = request.execute(&mut ctx);
        let ran = started.elapsed();

        if outcome == Outcome::Panicked {
            warn!(sequence, "write operation panicked; writer continues");
        }
        recording::record_write(outcome.as_label(), waited, ran);
        outcome
    }

    /// Close admission and resolve everything still queued: each request
    /// either runs (`Drain`) or receives `Abandoned` (`Abandon`).
    ///
    /// Runs at most once; later calls return the first report.
    fn resolve_pending(&mut self) -> DrainReport {
        if let Some(report) = self.resolved {
            return report;
        }
        self.rx.close();

        let mut report = DrainReport::default();
        // After close(), recv() still yields buffered requests and any sent
        // through permits reserved before the close, then returns None.
        while let Some(request) = block_on(self.rx.recv()) {
            match self.policy {
                ShutdownPolicy::Drain => {
                    self.execute(request);
                    report.executed += 1;
                }
                ShutdownPolicy::Abandon => {
                    let sequence = self.take_sequence();
                    request.reject(TurnstileError::Abandoned { sequence });
                    recording::record_abandoned();
                    report.abandoned += 1;
                }
            }
        }
        recording::set_queue_depth(0);

        info!(
            policy = %self.policy,
            executed = report.executed,
            abandoned = report.abandoned,
            "pending writes resolved"
        );
        self.resolved = Some(report);
        report
    }

    /// Resolve anything still queued (a worker that never ran), then close
    /// the database.
    pub(crate) fn finish(mut self) -> Result<DrainReport, TurnstileError> {
        let report = self.resolve_pending();
        self.db.close()?;
        Ok(report)
    }

    fn take_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker_with(
        policy: ShutdownPolicy,
        capacity: usize,
    ) -> (Worker, mpsc::Sender<WriteRequest>, CancellationToken) {
        let db = Database::open_in_memory().unwrap();
        db.connection()
            .execute_batch("CREATE TABLE log (seq INTEGER, tag TEXT)")
            .unwrap();
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        (Worker::new(db, rx, cancel.clone(), policy), tx, cancel)
    }

    fn log_op(
        tag: &'static str,
    ) -> impl FnOnce(&mut WriteContext<'_>) -> Result<u64, TurnstileError> + Send + 'static {
        move |ctx: &mut WriteContext<'_>| {
            ctx.execute(
                "INSERT INTO log (seq, tag) VALUES (?1, ?2)",
                rusqlite::params![ctx.sequence() as i64, tag],
            )?;
            Ok(ctx.sequence())
        }
    }

    #[test]
    fn run_returns_immediately_when_already_cancelled() {
        let (worker, _tx, cancel) = worker_with(ShutdownPolicy::Drain, 4);
        cancel.cancel();
        let worker = worker.run();
        assert_eq!(worker.next_sequence, 0);
    }

    #[test]
    fn run_exits_when_all_senders_are_dropped() {
        let (worker, tx, _cancel) = worker_with(ShutdownPolicy::Drain, 4);
        let (request, mut reply) = WriteRequest::new(log_op("only"));
        assert!(tx.try_send(request).is_ok());
        drop(tx);

        let worker = worker.run();
        assert_eq!(worker.next_sequence, 1);
        assert_eq!(reply.try_recv().unwrap().unwrap(), 0);
    }

    #[test]
    fn drain_executes_queued_requests_in_order() {
        let (worker, tx, cancel) = worker_with(ShutdownPolicy::Drain, 4);
        let mut replies = Vec::new();
        for tag in ["a", "b", "c"] {
            let (request, reply) = WriteRequest::new(log_op(tag));
            assert!(tx.try_send(request).is_ok());
            replies.push(reply);
        }

        cancel.cancel();
        let worker = worker.run();
        let report = worker.finish().unwrap();

        assert_eq!(report, DrainReport { executed: 3, abandoned: 0 });
        let sequences: Vec<u64> = replies
            .iter_mut()
            .map(|r| r.try_recv().unwrap().unwrap())
            .collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn abandon_resolves_queued_requests_without_running_them() {
        let (worker, tx, cancel) = worker_with(ShutdownPolicy::Abandon, 4);
        let mut replies = Vec::new();
        for tag in ["a", "b"] {
            let (request, reply) = WriteRequest::new(log_op(tag));
            assert!(tx.try_send(request).is_ok());
            replies.push(reply);
        }

        cancel.cancel();
        let report = worker.run().finish().unwrap();

        assert_eq!(report, DrainReport { executed: 0, abandoned: 2 });
        for mut reply in replies {
            let err = reply.try_recv().unwrap().unwrap_err();
            assert!(matches!(err, TurnstileError::Abandoned { .. }), "got {err:?}");
        }
    }

    #[test]
    fn run_resolves_queued_requests_without_finish() {
        let (worker, tx, cancel) = worker_with(ShutdownPolicy::Abandon, 4);
        let mut replies = Vec::new();
        for tag in ["a", "b", "c"] {
            let (request, reply) = WriteRequest::new(log_op(tag));
            assert!(tx.try_send(request).is_ok());
            replies.push(reply);
        }

        cancel.cancel();
        let worker = worker.run();

        for mut reply in replies {
            let err = reply.try_recv().unwrap().unwrap_err();
            assert!(matches!(err, TurnstileError::Abandoned { .. }), "got {err:?}");
        }
        // Admission is closed before the database is.
        let (late, _reply) = WriteRequest::new(log_op("late"));
        assert!(tx.try_send(late).is_err());
        assert_eq!(worker.finish().unwrap(), DrainReport { executed: 0, abandoned: 3 });
    }
}
