// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths and a non-zero queue capacity.

use crate::diagnostic::ConfigError;
use crate::model::TurnstileConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TurnstileConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.queue.capacity == 0 {
        errors.push(ConfigError::Validation {
            message: "queue.capacity must be at least 1".to_string(),
        });
    }

    if config.queue.worker_thread_name.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "queue.worker_thread_name must not be empty".to_string(),
        });
    }

    // Thread names cannot carry interior NULs.
    if config.queue.worker_thread_name.contains('\0') {
        errors.push(ConfigError::Validation {
            message: "queue.worker_thread_name must not contain NUL bytes".to_string(),
        });
    }

    let level = config.log.level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "log.level `{}` is not one of: {}",
                config.log.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
