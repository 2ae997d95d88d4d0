// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Write requests and the execution context handed to write operations.
//!
//! A caller's operation closure and its typed reply channel are sealed into
//! an [`Envelope`] so the queue can carry requests of any result type
//! through one channel without knowing what they do.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use rusqlite::{Connection, Params, Transaction};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use turnstile_core::TurnstileError;

/// What the writer thread hands to every operation.
///
/// Wraps the store connection together with the queue's cancellation token.
/// Operations run one at a time, so the connection is exclusively theirs for
/// the duration of the call.
pub struct WriteContext<'a> {
    conn: &'a mut Connection,
    cancel: &'a CancellationToken,
    sequence: u64,
}

impl<'a> WriteContext<'a> {
    pub(crate) fn new(conn: &'a mut Connection, cancel: &'a CancellationToken, sequence: u64) -> Self {
        Self {
            conn,
            cancel,
            sequence,
        }
    }

    /// Shared access to the connection, for queries inside a write.
    pub fn connection(&self) -> &Connection {
        self.conn
    }

    /// Exclusive access to the connection.
    pub fn connection_mut(&mut self) -> &mut Connection {
        self.conn
    }

    /// Execute a single statement. Returns the number of rows changed.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize, rusqlite::Error> {
        self.conn.execute(sql, params)
    }

    /// Execute several semicolon-separated statements with no parameters.
    pub fn execute_batch(&self, sql: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(sql)
    }

    /// Begin a deferred transaction. Dropping it without `commit` rolls back.
    pub fn transaction(&mut self) -> Result<Transaction<'_>, rusqlite::Error> {
        self.conn.transaction()
    }

    /// Rowid of the most recent successful INSERT on this connection.
    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// True once the queue has begun shutting down.
    ///
    /// Long-running operations may poll this and bail out early; the queue
    /// never interrupts an operation on its own.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The queue's cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        self.cancel
    }

    /// Zero-based position of this request in the queue's execution order.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// How an executed request ended, as seen by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Ok,
    Failed,
    Panicked,
}

impl Outcome {
    pub(crate) fn as_label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "error",
            Self::Panicked => "panicked",
        }
    }
}

/// Type-erased pairing of an operation with its reply channel.
pub(crate) trait Envelope: Send {
    /// Run the operation and deliver its result. Consumes the envelope.
    fn execute(self: Box<Self>, ctx: &mut WriteContext<'_>) -> Outcome;

    /// Deliver `err` without running the operation. Consumes the envelope.
    fn reject(self: Box<Self>, err: TurnstileError);
}

struct TypedEnvelope<F, T, E> {
    op: F,
    reply: oneshot::Sender<Result<T, E>>,
}

impl<F, T, E> Envelope for TypedEnvelope<F, T, E>
where
    F: FnOnce(&mut WriteContext<'_>) -> Result<T, E> + Send,
    T: Send,
    E: From<TurnstileError> + Send,
{
    fn execute(self: Box<Self>, ctx: &mut WriteContext<'_>) -> Outcome {
        let TypedEnvelope { op, reply } = *self;
        let sequence = ctx.sequence();

        let (result, outcome) = match panic::catch_unwind(AssertUnwindSafe(|| op(ctx))) {
            Ok(Ok(value)) => (Ok(value), Outcome::Ok),
            Ok(Err(e)) => (Err(e), Outcome::Failed),
            Err(payload) => (
                Err(E::from(TurnstileError::OperationPanicked {
                    sequence,
                    message: panic_message(payload.as_ref()),
                })),
                Outcome::Panicked,
            ),
        };

        // The caller may have stopped waiting; the write still happened.
        let _ = reply.send(result);
        outcome
    }

    fn reject(self: Box<Self>, err: TurnstileError) {
        let _ = self.reply.send(Err(E::from(err)));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// One unit of work waiting in the admission queue.
pub(crate) struct WriteRequest {
    envelope: Box<dyn Envelope>,
    enqueued_at: Instant,
}

impl WriteRequest {
    /// Seal `op` and return the request plus the receiver its result will arrive on.
    pub(crate) fn new<F, T, E>(op: F) -> (Self, oneshot::Receiver<Result<T, E>>)
    where
        F: FnOnce(&mut WriteContext<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<TurnstileError> + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let request = Self {
            envelope: Box::new(TypedEnvelope { op, reply }),
            enqueued_at: Instant::now(),
        };
        (request, rx)
    }

    pub(crate) fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    pub(crate) fn execute(self, ctx: &mut WriteContext<'_>) -> Outcome {
        self.envelope.execute(ctx)
    }

    pub(crate) fn reject(self, err: TurnstileError) {
        self.envelope.reject(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_context<R>(f: impl FnOnce(&mut WriteContext<'_>) -> R) -> R {
        let mut conn = Connection::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        let mut ctx = WriteContext::new(&mut conn, &cancel, 7);
        f(&mut ctx)
    }

    #[test]
    fn execute_delivers_value() {
        let (request, mut rx) = WriteRequest::new(|ctx: &mut WriteContext<'_>| {
            ctx.execute_batch("CREATE TABLE t (x INTEGER)")?;
            ctx.execute("INSERT INTO t VALUES (?1)", [42])?;
            Ok::<_, TurnstileError>(ctx.last_insert_rowid())
        });

        let outcome = with_context(|ctx| request.execute(ctx));
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(rx.try_recv().unwrap().unwrap(), 1);
    }

    #[test]
    fn execute_delivers_operation_error_verbatim() {
        let (request, mut rx) = WriteRequest::new(|_ctx: &mut WriteContext<'_>| {
            Err::<(), _>(TurnstileError::operation("constraint violated"))
        });

        let outcome = with_context(|ctx| request.execute(ctx));
        assert_eq!(outcome, Outcome::Failed);
        let err = rx.try_recv().unwrap().unwrap_err();
        assert!(matches!(err, TurnstileError::Operation { ref message, .. } if message == "constraint violated"));
    }

    #[test]
    fn panicking_operation_is_reported_not_propagated() {
        let (request, mut rx) = WriteRequest::new(|_ctx: &mut WriteContext<'_>| -> Result<(), TurnstileError> {
            panic!("bad write");
        });

        let outcome = with_context(|ctx| request.execute(ctx));
        assert_eq!(outcome, Outcome::Panicked);
        let err = rx.try_recv().unwrap().unwrap_err();
        assert!(matches!(
            err,
            TurnstileError::OperationPanicked { sequence: 7, ref message } if message == "bad write"
        ));
    }

    #[test]
    fn reject_delivers_error_without_running() {
        let (request, mut rx) = WriteRequest::new(|_ctx: &mut WriteContext<'_>| -> Result<(), TurnstileError> {
            panic!("must not run");
        });

        request.reject(TurnstileError::Abandoned { sequence: 3 });
        let err = rx.try_recv().unwrap().unwrap_err();
        assert!(matches!(err, TurnstileError::Abandoned { sequence: 3 }));
    }

    #[test]
    fn context_reports_cancellation() {
        let mut conn = Connection::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        let ctx = WriteContext::new(&mut conn, &cancel, 0);
        assert!(!ctx.is_cancelled());
        cancel.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.cancellation_token().is_cancelled());
    }

    #[test]
    fn transaction_rolls_back_on_drop() {
        with_context(|ctx| {
            ctx.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
            {
                let tx = ctx.transaction().unwrap();
                tx.execute("INSERT INTO t VALUES (1)", []).unwrap();
            }
            let count: i64 = ctx
                .connection()
                .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 0);
        });
    }
}
