// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Turnstile write queue.
//!
//! This crate provides the error type and the small lifecycle types shared
//! by the storage, configuration and queue crates.

pub mod error;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TurnstileError;
pub use types::{HealthStatus, QueueState, ShutdownPolicy};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_errors_are_classified() {
        assert!(TurnstileError::ShuttingDown.is_queue_error());
        assert!(TurnstileError::Abandoned { sequence: 3 }.is_queue_error());
        assert!(TurnstileError::WorkerLost.is_queue_error());
        assert!(!TurnstileError::operation("boom").is_queue_error());
        assert!(
            !TurnstileError::Close {
                source: Box::new(std::io::Error::other("disk gone")),
            }
            .is_queue_error()
        );
    }

    #[test]
    fn rusqlite_errors_map_to_storage() {
        let err: TurnstileError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, TurnstileError::Storage { .. }));
        assert!(err.to_string().starts_with("storage error"));
    }

    #[test]
    fn shutting_down_message_is_stable() {
        assert_eq!(
            TurnstileError::ShuttingDown.to_string(),
            "write queue is shutting down"
        );
    }

    #[test]
    fn queue_state_round_trips_through_u8() {
        use std::str::FromStr;

        for state in [
            QueueState::Created,
            QueueState::Running,
            QueueState::ShuttingDown,
            QueueState::Stopped,
        ] {
            assert_eq!(QueueState::from_u8(state as u8), state);
            assert_eq!(QueueState::from_str(&state.to_string()).unwrap(), state);
        }
        assert_eq!(QueueState::ShuttingDown.to_string(), "shutting_down");
    }

    #[test]
    fn only_created_and_running_accept_submissions() {
        assert!(QueueState::Created.accepts_submissions());
        assert!(QueueState::Running.accepts_submissions());
        assert!(!QueueState::ShuttingDown.accepts_submissions());
        assert!(!QueueState::Stopped.accepts_submissions());
    }

    #[test]
    fn shutdown_policy_serialization() {
        assert_eq!(ShutdownPolicy::default(), ShutdownPolicy::Drain);
        let json = serde_json::to_string(&ShutdownPolicy::Abandon).unwrap();
        assert_eq!(json, "\"abandon\"");
        let parsed: ShutdownPolicy = serde_json::from_str("\"drain\"").unwrap();
        assert_eq!(parsed, ShutdownPolicy::Drain);
    }

    #[test]
    fn health_status_variants() {
        let healthy = HealthStatus::Healthy;
        let degraded = HealthStatus::Degraded("slow".into());
        let unhealthy = HealthStatus::Unhealthy("down".into());

        assert_eq!(healthy, HealthStatus::Healthy);
        assert_ne!(degraded, healthy);
        assert_ne!(unhealthy, healthy);
    }
}
