// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Turnstile configuration system.

use turnstile_config::diagnostic::ConfigError;
use turnstile_config::model::{SynchronousMode, TurnstileConfig};
use turnstile_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};
use turnstile_core::ShutdownPolicy;

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_turnstile_config() {
    let toml = r#"
[storage]
database_path = "/tmp/test.db"
wal_mode = false
busy_timeout_ms = 250
foreign_keys = false
synchronous = "full"
checkpoint_on_close = false

[queue]
capacity = 8
shutdown_policy = "abandon"
worker_thread_name = "db-writer"

[log]
level = "debug"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.storage.database_path, "/tmp/test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.storage.busy_timeout_ms, 250);
    assert!(!config.storage.foreign_keys);
    assert_eq!(config.storage.synchronous, SynchronousMode::Full);
    assert!(!config.storage.checkpoint_on_close);
    assert_eq!(config.queue.capacity, 8);
    assert_eq!(config.queue.shutdown_policy, ShutdownPolicy::Abandon);
    assert_eq!(config.queue.worker_thread_name, "db-writer");
    assert_eq!(config.log.level, "debug");
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_optional_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.storage.database_path, "turnstile.db");
    assert!(config.storage.wal_mode);
    assert_eq!(config.storage.busy_timeout_ms, 5_000);
    assert!(config.storage.foreign_keys);
    assert_eq!(config.storage.synchronous, SynchronousMode::Normal);
    assert!(config.storage.checkpoint_on_close);
    assert_eq!(config.queue.capacity, 100);
    assert_eq!(config.queue.shutdown_policy, ShutdownPolicy::Drain);
    assert_eq!(config.queue.worker_thread_name, "turnstile-writer");
    assert_eq!(config.log.level, "info");
}

/// Unknown field in [queue] is rejected by deny_unknown_fields.
#[test]
fn unknown_field_in_queue_produces_error() {
    let toml = r#"
[queue]
capasity = 4
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("capasity"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// Unexpected top-level section is rejected.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[logging]
level = "debug"
"#;

    let err = load_config_from_str(toml).expect_err("unknown top-level section should be rejected");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("logging"),
        "error should mention unknown field, got: {err_str}"
    );
}

/// A dotted override (what the env provider produces) wins over TOML.
#[test]
fn dotted_override_wins_over_toml() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let toml_content = r#"
[queue]
capacity = 10
"#;

    let config: TurnstileConfig = Figment::new()
        .merge(Serialized::defaults(TurnstileConfig::default()))
        .merge(Toml::string(toml_content))
        .merge(("queue.capacity", 3))
        .merge(("storage.database_path", "/var/lib/app.db"))
        .extract()
        .expect("should merge overrides");

    assert_eq!(config.queue.capacity, 3);
    assert_eq!(config.storage.database_path, "/var/lib/app.db");
}

/// Missing config files are silently skipped.
#[test]
fn missing_config_files_silently_skipped() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let config: TurnstileConfig = Figment::new()
        .merge(Serialized::defaults(TurnstileConfig::default()))
        .merge(Toml::file("/nonexistent/path/turnstile.toml"))
        .extract()
        .expect("missing file should be silently skipped");

    assert_eq!(config.queue.capacity, 100);
}

/// Unknown key "capasity" produces an UnknownKey diagnostic with a suggestion.
#[test]
fn diagnostic_error_includes_unknown_key() {
    let toml = r#"
[queue]
capasity = 4
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let has_unknown_key = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "capasity"
                && suggestion.as_deref() == Some("capacity")
                && valid_keys.contains("shutdown_policy")
        })
    });
    assert!(
        has_unknown_key,
        "should have UnknownKey error for 'capasity', got: {errors:?}"
    );
}

#[test]
fn diagnostic_no_suggestion_for_distant_typo() {
    let toml = r#"
[queue]
zzzzzz = 4
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    assert!(errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion: None, .. } if key == "zzzzzz")
    }));
}

/// An unknown shutdown policy names the accepted variants.
#[test]
fn diagnostic_unknown_shutdown_policy() {
    let toml = r#"
[queue]
shutdown_policy = "wait"
"#;

    let errors = load_and_validate_str(toml).expect_err("unknown variant should fail");
    let has_variant_error = errors.iter().any(|e| match e {
        ConfigError::InvalidValue { detail, .. } => {
            detail.contains("drain") && detail.contains("abandon")
        }
        ConfigError::Other(message) => message.contains("wait"),
        _ => false,
    });
    assert!(has_variant_error, "got: {errors:?}");
}

/// Invalid type (string where number expected) produces a clear message.
#[test]
fn diagnostic_invalid_type_message() {
    let toml = r#"
[queue]
capacity = "lots"
"#;

    let err = load_config_from_str(toml).expect_err("should reject invalid type");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("invalid type") || err_str.contains("capacity"),
        "error should mention type mismatch, got: {err_str}"
    );
}

/// ConfigError can be rendered using miette's graphical handler.
#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "capasity".to_string(),
        suggestion: Some("capacity".to_string()),
        valid_keys: "capacity, shutdown_policy, worker_thread_name".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some(), "should have diagnostic code");
    let help = error.help().expect("should have help text").to_string();
    assert!(help.contains("did you mean `capacity`"), "got: {help}");

    let handler = GraphicalReportHandler::new();
    let mut buf = String::new();
    handler
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("capasity"));
}

/// Validation catches a zero-capacity queue.
#[test]
fn validation_catches_zero_capacity() {
    let toml = r#"
[queue]
capacity = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("zero capacity should fail");
    assert!(errors.iter().any(|e| {
        matches!(e, ConfigError::Validation { message } if message.contains("queue.capacity"))
    }));
}

/// A config file on disk is loaded and validated.
#[test]
fn load_and_validate_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("turnstile.toml");
    std::fs::write(&path, "[queue]\ncapacity = 12\n").unwrap();

    let config = load_and_validate_path(&path).expect("file config should validate");
    assert_eq!(config.queue.capacity, 12);
}
