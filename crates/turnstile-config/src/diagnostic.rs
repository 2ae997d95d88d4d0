// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Figment errors become [`ConfigError`]s that miette can render, with the
//! offending key underlined in its TOML file and a "did you mean" hint when a
//! known key is close enough.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score above which a known key is offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration error with rich diagnostic information.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A key that no config section accepts, e.g. `capasity`.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(turnstile::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Closest known key, if any is similar enough.
        suggestion: Option<String>,
        /// Comma-separated keys accepted by the section.
        valid_keys: String,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value of the wrong type, e.g. `capacity = "lots"`.
    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(code(turnstile::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    /// A value is not one of the accepted variants (e.g. `shutdown_policy = "wait"`).
    #[error("invalid value for key `{key}`: {detail}")]
    #[diagnostic(code(turnstile::config::invalid_value))]
    InvalidValue { key: String, detail: String },

    /// A semantic check failed after deserialization.
    #[error("validation error: {message}")]
    #[diagnostic(code(turnstile::config::validation))]
    Validation { message: String },

    /// Any other figment failure, carried as its message.
    #[error("configuration error: {0}")]
    #[diagnostic(code(turnstile::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert a figment error into diagnostics, one per underlying error.
///
/// `toml_sources` holds `(path, content)` for every file that was merged, so
/// unknown keys can be pointed at in the file they came from.
pub(crate) fn from_figment(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let key = error.path.join(".");
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let (span, src) = locate(&error, field, toml_sources);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        suggestion: closest_key(field, expected),
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                    key,
                    detail: format!("found {actual}, expected {expected}"),
                    expected: expected.clone(),
                },
                Kind::UnknownVariant(variant, expected) => ConfigError::InvalidValue {
                    key,
                    detail: format!("`{variant}` is not one of: {}", expected.join(", ")),
                },
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Span of `field` in the file the error was read from, when that file is known.
fn locate(
    error: &figment::error::Error,
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Some(figment::Source::File(path)) = error.metadata.as_ref().and_then(|m| m.source.as_ref())
    else {
        return (None, None);
    };
    let path = path.display().to_string();
    let Some((_, content)) = toml_sources.iter().find(|(p, _)| *p == path) else {
        return (None, None);
    };

    match key_offset(content, error.path.first().map(String::as_str), field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(path, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field = ...` within `[section]`, or from the top for root keys.
fn key_offset(content: &str, section: Option<&str>, field: &str) -> Option<usize> {
    let start = match section {
        None => 0,
        Some(section) => {
            let header = format!("[{section}]");
            content.find(&header)? + header.len()
        }
    };

    let mut offset = start;
    for line in content[start..].split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') {
            return None;
        }
        if let Some(rest) = trimmed.strip_prefix(field)
            && rest.trim_start().starts_with('=')
        {
            return Some(offset + line.len() - trimmed.len());
        }
        offset += line.len();
    }
    None
}

fn closest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render a list of `ConfigError`s to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        if handler.render_report(&mut buf, error).is_ok() {
            eprint!("{buf}");
        } else {
            eprintln!("Error: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Format;

    #[test]
    fn suggests_capacity_for_capasity() {
        let valid = &["capacity", "shutdown_policy", "worker_thread_name"];
        assert_eq!(closest_key("capasity", valid), Some("capacity".to_string()));
    }

    #[test]
    fn no_suggestion_for_distant_typo() {
        let valid = &["capacity", "shutdown_policy", "worker_thread_name"];
        assert_eq!(closest_key("zzzzzz", valid), None);
    }

    #[test]
    fn key_offset_finds_key_inside_its_section() {
        let content = "[storage]\nwal_mode = true\n\n[queue]\ncapasity = 4\n";
        let o = key_offset(content, Some("queue"), "capasity").unwrap();
        assert_eq!(&content[o..o + 8], "capasity");
    }

    #[test]
    fn key_offset_stops_at_the_next_section() {
        let content = "[queue]\ncapacity = 4\n\n[log]\ncapasity = 4\n";
        assert_eq!(key_offset(content, Some("queue"), "capasity"), None);
    }

    #[test]
    fn key_offset_without_section_header() {
        let content = "[storage]\nwal_mode = true\n";
        assert_eq!(key_offset(content, Some("queue"), "capacity"), None);
    }

    fn extract_error(toml: figment::providers::Data<figment::providers::Toml>) -> figment::Error {
        figment::Figment::from(figment::providers::Serialized::defaults(
            crate::model::TurnstileConfig::default(),
        ))
        .merge(toml)
        .extract::<crate::model::TurnstileConfig>()
        .unwrap_err()
    }

    #[test]
    fn unknown_key_in_file_is_underlined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turnstile.toml");
        let content = "[queue]\ncapasity = 4\n";
        std::fs::write(&path, content).unwrap();

        let err = extract_error(figment::providers::Toml::file(&path));
        let sources = [(path.display().to_string(), content.to_string())];
        let errors = from_figment(err, &sources);

        match &errors[..] {
            [ConfigError::UnknownKey { span: Some(span), src: Some(_), .. }] => {
                assert_eq!(&content[span.offset()..span.offset() + span.len()], "capasity");
            }
            other => panic!("expected an underlined unknown key, got {other:?}"),
        }
    }

    #[test]
    fn inline_toml_has_no_span() {
        let content = "[queue]\ncapasity = 4\n";
        let err = extract_error(figment::providers::Toml::string(content));
        let errors = from_figment(err, &[("turnstile.toml".to_string(), content.to_string())]);
        assert!(matches!(
            &errors[..],
            [ConfigError::UnknownKey { span: None, src: None, .. }]
        ));
    }
}
