// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Turnstile integration tests.
//!
//! Provides a harness that stands up a started [`WriteQueue`] over a
//! throwaway SQLite file, plus canned write operations for exercising it.
//!
//! # Components
//!
//! - [`TestQueue`] - Started queue over a temp database with a fixture schema
//! - [`Gate`] - Write operation that holds the writer until released
//!
//! [`WriteQueue`]: turnstile_queue::WriteQueue

pub mod gate;
pub mod harness;

pub use gate::Gate;
pub use harness::{TestQueue, increment_counter, record_event};
