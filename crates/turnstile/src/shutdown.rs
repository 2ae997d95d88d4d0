// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signal handling.
//!
//! Installs handlers for SIGTERM and SIGINT (Ctrl+C), triggering a
//! [`CancellationToken`]. Write queues built with this token as their parent
//! stop admitting work as soon as a signal arrives.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
/// If no handler can be installed the token is never cancelled by this task.
/// Must be called from inside a Tokio runtime.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        if wait_for_signal().await {
            token_clone.cancel();
            debug!("shutdown signal handler completed");
        } else {
            warn!("no shutdown signal can be received; only an explicit stop ends the run");
        }
    });

    token
}

/// Resolves to `true` once SIGINT or SIGTERM arrives, or `false` if neither can be observed.
#[cfg(unix)]
async fn wait_for_signal() -> bool {
    use tokio::signal::unix::{SignalKind, signal};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                result = ctrl_c => {
                    if interrupted(result) {
                        return true;
                    }
                    let received = sigterm.recv().await.is_some();
                    if received {
                        info!("received SIGTERM, initiating shutdown");
                    }
                    received
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                    true
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler, listening for Ctrl+C only");
            interrupted(ctrl_c.await)
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> bool {
    interrupted(tokio::signal::ctrl_c().await)
}

/// Interpret the outcome of waiting on Ctrl+C. A listener error is not a signal.
fn interrupted(result: std::io::Result<()>) -> bool {
    match result {
        Ok(()) => {
            info!("received SIGINT (Ctrl+C), initiating shutdown");
            true
        }
        Err(e) => {
            warn!(error = %e, "failed to listen for Ctrl+C");
            false
        }
    }
}
