// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-writer queue for SQLite.
//!
//! Every mutating operation against the store is submitted to a
//! [`WriteQueue`] and executed, one at a time and in admission order, on a
//! dedicated writer thread that owns the only read-write connection.
//!
//! ```no_run
//! # async fn demo() -> Result<(), turnstile_core::TurnstileError> {
//! use turnstile_config::model::QueueConfig;
//! use turnstile_queue::{WriteContext, WriteQueue};
//! use turnstile_storage::Database;
//!
//! let db = Database::open_in_memory()?;
//! let queue = WriteQueue::new(db, &QueueConfig::default());
//! queue.start()?;
//!
//! let rows = queue
//!     .submit(|ctx: &mut WriteContext<'_>| {
//!         ctx.execute_batch("CREATE TABLE IF NOT EXISTS kv (k TEXT, v TEXT)")?;
//!         Ok::<_, turnstile_core::TurnstileError>(ctx.execute("INSERT INTO kv VALUES ('a', 'b')", [])?)
//!     })
//!     .await?;
//! assert_eq!(rows, 1);
//!
//! queue.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod queue;
pub mod recording;
pub mod request;
mod worker;

pub use queue::WriteQueue;
pub use recording::register_metrics;
pub use request::WriteContext;
