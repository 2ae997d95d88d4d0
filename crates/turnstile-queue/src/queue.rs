// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The write queue: admission, submission and the start/stop lifecycle.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use turnstile_config::model::QueueConfig;
use turnstile_core::{QueueState, ShutdownPolicy, TurnstileError};
use turnstile_storage::Database;

use crate::recording;
use crate::request::{WriteContext, WriteRequest};
use crate::worker::Worker;

/// Serializes every write against one SQLite database.
///
/// Producers call [`submit`](Self::submit) from any number of tasks; a single
/// writer thread executes the operations one at a time in the order they were
/// admitted. The admission queue is bounded: when it is full, `submit` waits
/// for a free slot.
///
/// A queue is created once, started once and stopped once.
pub struct WriteQueue {
    tx: mpsc::Sender<WriteRequest>,
    cancel: CancellationToken,
    state: AtomicU8,
    capacity: usize,
    policy: ShutdownPolicy,
    thread_name: String,
    /// Present until `start` moves it onto the writer thread.
    worker: Mutex<Option<Worker>>,
    join: Mutex<Option<JoinHandle<Worker>>>,
}

impl WriteQueue {
    /// Create a queue around an already-open database.
    ///
    /// Performs no I/O. The queue admits submissions immediately, but nothing
    /// executes until [`start`](Self::start) is called.
    pub fn new(db: Database, config: &QueueConfig) -> Self {
        Self::with_cancel(db, config, CancellationToken::new())
    }

    /// Like [`new`](Self::new), with the queue's token derived from `parent`.
    ///
    /// Cancelling `parent` (e.g. on SIGTERM) stops admission, and the writer
    /// resolves everything already admitted per the shutdown policy.
    /// [`stop`](Self::stop) must still be called to close the database.
    pub fn with_token(db: Database, config: &QueueConfig, parent: &CancellationToken) -> Self {
        Self::with_cancel(db, config, parent.child_token())
    }

    fn with_cancel(db: Database, config: &QueueConfig, cancel: CancellationToken) -> Self {
        let capacity = config.capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let worker = Worker::new(db, rx, cancel.clone(), config.shutdown_policy);

        debug!(
            capacity,
            policy = %config.shutdown_policy,
            "write queue created"
        );

        Self {
            tx,
            cancel,
            state: AtomicU8::new(QueueState::Created as u8),
            capacity,
            policy: config.shutdown_policy,
            thread_name: config.worker_thread_name.clone(),
            worker: Mutex::new(Some(worker)),
            join: Mutex::new(None),
        }
    }

    /// Spawn the writer thread.
    ///
    /// Returns [`TurnstileError::AlreadyStarted`] on a second call and
    /// [`TurnstileError::Stopped`] once the queue has been stopped.
    pub fn start(&self) -> Result<(), TurnstileError> {
        // Held until the handle is stored so a concurrent `stop` cannot miss it.
        let mut join = self.join.lock().unwrap_or_else(PoisonError::into_inner);

        if let Err(current) = self.state.compare_exchange(
            QueueState::Created as u8,
            QueueState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(match QueueState::from_u8(current) {
                QueueState::Running => TurnstileError::AlreadyStarted,
                _ => TurnstileError::Stopped,
            });
        }

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TurnstileError::AlreadyStarted)?;

        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || worker.run())
            .map_err(|e| {
                // The worker (and with it the database) went down with the closure.
                self.cancel.cancel();
                self.set_state(QueueState::Stopped);
                error!(error = %e, "failed to spawn writer thread");
                TurnstileError::Internal(format!("failed to spawn writer thread: {e}"))
            })?;

        *join = Some(handle);
        info!(thread = %self.thread_name, capacity = self.capacity, "write queue started");
        Ok(())
    }

    /// Execute `op` on the writer thread and return its result.
    ///
    /// Fails with [`TurnstileError::ShuttingDown`] (converted into `E`)
    /// without enqueuing anything if shutdown has begun, including while
    /// waiting for a free slot in a full queue. Once admitted, the request
    /// is resolved exactly once: by running `op`, or per the queue's
    /// [`ShutdownPolicy`] if the queue stops first.
    ///
    /// Dropping the returned future after admission does not withdraw the
    /// request; the write still runs and its result is discarded.
    pub async fn submit<F, T, E>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&mut WriteContext<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<TurnstileError> + Send + 'static,
    {
        // One biased select makes the shutdown check and the slot
        // reservation a single step: after cancellation no permit is taken.
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                recording::record_rejected();
                return Err(E::from(TurnstileError::ShuttingDown));
            }
            permit = self.tx.reserve() => {
                permit.map_err(|_| E::from(TurnstileError::WorkerLost))?
            }
        };

        let (request, reply) = WriteRequest::new(op);
        permit.send(request);

        reply
            .await
            .unwrap_or_else(|_| Err(E::from(TurnstileError::WorkerLost)))
    }

    /// Like [`submit`](Self::submit), with the argument passed separately.
    pub async fn submit_with<F, A, T, E>(&self, op: F, arg: A) -> Result<T, E>
    where
        F: FnOnce(&mut WriteContext<'_>, A) -> Result<T, E> + Send + 'static,
        A: Send + 'static,
        T: Send + 'static,
        E: From<TurnstileError> + Send + 'static,
    {
        self.submit(move |ctx: &mut WriteContext<'_>| op(ctx, arg))
            .await
    }

    /// Blocking form of [`submit`](Self::submit) for synchronous callers.
    ///
    /// Parks the calling thread until the write completes. Do not call this
    /// from inside an async task; use `submit(..).await` there.
    pub fn submit_blocking<F, T, E>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&mut WriteContext<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<TurnstileError> + Send + 'static,
    {
        futures::executor::block_on(self.submit(op))
    }

    /// Stop admitting requests, wait for the writer to exit, resolve whatever
    /// is still queued, and close the database.
    ///
    /// Returns the error from closing the database, if any. Calling `stop`
    /// again (or concurrently) returns `Ok(())` without doing anything.
    pub async fn stop(&self) -> Result<(), TurnstileError> {
        // Cancel first: admission must be closed by the time anyone can
        // observe the ShuttingDown state.
        self.cancel.cancel();
        let previous = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                QueueState::from_u8(raw)
                    .accepts_submissions()
                    .then_some(QueueState::ShuttingDown as u8)
            });
        // Err: someone else is stopping (or has stopped) the queue.
        let Ok(previous) = previous.map(QueueState::from_u8) else {
            return Ok(());
        };

        info!(state = %previous, policy = %self.policy, "write queue stopping");

        let handle = self.join.lock().unwrap_or_else(PoisonError::into_inner).take();
        let idle = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();

        let result = tokio::task::spawn_blocking(move || {
            let worker = match (handle, idle) {
                (Some(handle), _) => handle.join().map_err(|_| {
                    TurnstileError::Internal("writer thread panicked".to_string())
                })?,
                (None, Some(worker)) => worker,
                (None, None) => return Ok(()),
            };
            worker.finish().map(|_| ())
        })
        .await
        .unwrap_or_else(|e| Err(TurnstileError::Internal(format!("shutdown task failed: {e}"))));

        self.set_state(QueueState::Stopped);
        match &result {
            Ok(()) => info!("write queue stopped"),
            Err(e) => warn!(error = %e, "write queue stopped with error"),
        }
        result
    }

    /// Current lifecycle state.
    ///
    /// Reports `ShuttingDown` as soon as the cancellation token fires, even if
    /// it was cancelled through a parent token rather than by `stop`.
    pub fn state(&self) -> QueueState {
        let state = QueueState::from_u8(self.state.load(Ordering::Acquire));
        if state.accepts_submissions() && self.cancel.is_cancelled() {
            QueueState::ShuttingDown
        } else {
            state
        }
    }

    /// Fixed capacity of the admission queue.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Requests admitted but not yet picked up by the writer, including
    /// slots reserved by producers that are about to send.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Policy applied to pending requests on [`stop`](Self::stop).
    pub fn shutdown_policy(&self) -> ShutdownPolicy {
        self.policy
    }

    /// The queue's cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn set_state(&self, state: QueueState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        if self.state().accepts_submissions() {
            warn!("write queue dropped without stop(); pending writes are discarded");
        }
        // The detached writer resolves what is queued, then drops the database.
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteQueue")
            .field("state", &self.state())
            .field("capacity", &self.capacity)
            .field("pending", &self.pending())
            .field("policy", &self.policy)
            .finish()
    }
}
