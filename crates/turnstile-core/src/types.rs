// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the queue, storage and configuration crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by store health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Store is fully operational.
    Healthy,
    /// Store is operational but experiencing issues.
    Degraded(String),
    /// Store is not operational.
    Unhealthy(String),
}

/// Lifecycle state of a write queue.
///
/// Transitions only move forward: `Created -> Running -> ShuttingDown -> Stopped`,
/// or `Created -> Stopped` when a queue is stopped without ever being started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum QueueState {
    Created = 0,
    Running = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl QueueState {
    /// Decode a state previously stored with `as u8`.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Stopped,
        }
    }

    /// Whether new submissions can still be admitted in this state.
    pub fn accepts_submissions(self) -> bool {
        matches!(self, Self::Created | Self::Running)
    }
}

/// What happens to requests that were admitted but not yet executed when
/// the queue is stopped.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Execute every admitted request, in order, before closing the store.
    #[default]
    Drain,
    /// Resolve every admitted request with `TurnstileError::Abandoned`.
    Abandon,
}
