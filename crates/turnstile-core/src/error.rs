// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Turnstile write queue.

use thiserror::Error;

/// The primary error type used across the Turnstile crates.
///
/// Write operations may return their own error type instead, as long as it
/// implements `From<TurnstileError>` so queue-level failures can reach the
/// caller through it.
#[derive(Debug, Error)]
pub enum TurnstileError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// The store could not be opened or failed its initial health check.
    #[error("failed to connect to database at {path}: {source}")]
    Connection {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A SQLite error raised while executing a write.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A write operation failed for a reason of its own.
    #[error("operation failed: {message}")]
    Operation {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Submission was attempted after shutdown began. Nothing was enqueued.
    #[error("write queue is shutting down")]
    ShuttingDown,

    /// The request was admitted but discarded unexecuted during shutdown.
    #[error("write request {sequence} abandoned during shutdown")]
    Abandoned { sequence: u64 },

    /// The operation panicked on the writer thread.
    #[error("write operation {sequence} panicked: {message}")]
    OperationPanicked { sequence: u64, message: String },

    /// The writer thread went away without delivering a result.
    #[error("writer thread exited before delivering a result")]
    WorkerLost,

    /// `start()` was called on a queue that is already running.
    #[error("write queue already started")]
    AlreadyStarted,

    /// The queue has been stopped and cannot be restarted.
    #[error("write queue is stopped")]
    Stopped,

    /// Closing the store during shutdown failed.
    #[error("failed to close database: {source}")]
    Close {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TurnstileError {
    /// Build an [`TurnstileError::Operation`] from a message alone.
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
            source: None,
        }
    }

    /// True for errors produced by the queue itself rather than by an operation.
    pub fn is_queue_error(&self) -> bool {
        matches!(
            self,
            Self::ShuttingDown
                | Self::Abandoned { .. }
                | Self::WorkerLost
                | Self::AlreadyStarted
                | Self::Stopped
        )
    }
}

impl From<rusqlite::Error> for TurnstileError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage {
            source: Box::new(e),
        }
    }
}
