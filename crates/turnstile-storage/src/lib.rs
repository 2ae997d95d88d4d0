// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite connection management for the Turnstile write queue.
//!
//! Opens a WAL-mode SQLite database with the configured PRAGMAs, verifies it
//! with a ping, and closes it with a WAL checkpoint. The resulting
//! [`Database`] is handed to `turnstile-queue`, whose single writer thread
//! becomes the only code that mutates the file.

pub mod database;

pub use database::Database;
