// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. Without an installed recorder every call is a no-op.

use std::time::Duration;

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Turnstile metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "turnstile_writes_total",
        "Write requests resolved by the writer, labelled by outcome"
    );
    describe_counter!(
        "turnstile_rejected_total",
        "Submissions refused because the queue was shutting down"
    );
    describe_gauge!(
        "turnstile_queue_depth",
        "Requests admitted but not yet picked up by the writer"
    );
    describe_histogram!(
        "turnstile_queue_wait_seconds",
        "Time between admission and the start of execution"
    );
    describe_histogram!(
        "turnstile_write_duration_seconds",
        "Time spent executing a single write operation"
    );
}

/// Record an executed write.
pub(crate) fn record_write(outcome: &'static str, waited: Duration, ran: Duration) {
    metrics::counter!("turnstile_writes_total", "outcome" => outcome).increment(1);
    metrics::histogram!("turnstile_queue_wait_seconds").record(waited.as_secs_f64());
    metrics::histogram!("turnstile_write_duration_seconds").record(ran.as_secs_f64());
}

/// Record a request resolved without execution during shutdown.
pub(crate) fn record_abandoned() {
    metrics::counter!("turnstile_writes_total", "outcome" => "abandoned").increment(1);
}

/// Record a refused submission.
pub(crate) fn record_rejected() {
    metrics::counter!("turnstile_rejected_total").increment(1);
}

/// Set the current admission queue depth.
pub(crate) fn set_queue_depth(depth: usize) {
    metrics::gauge!("turnstile_queue_depth").set(depth as f64);
}
