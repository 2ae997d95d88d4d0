// SPDX-FileCopyrightText: 2026 Turnstile Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A write operation that parks the writer thread until the test says go.
//!
//! Lets tests fill the admission queue deterministically: submit the gate,
//! wait for [`Gate::entered`], and every later submission stays queued until
//! [`Gate::open`] is called (or the gate is dropped).

use std::sync::mpsc;

use tokio::sync::oneshot;
use turnstile_core::TurnstileError;
use turnstile_queue::WriteContext;

/// Test-side handle of a gate operation.
pub struct Gate {
    release: mpsc::Sender<()>,
    entered: Option<oneshot::Receiver<u64>>,
}

impl Gate {
    /// Create a gate and the operation to submit for it.
    ///
    /// The operation returns its own sequence number once released.
    pub fn new() -> (
        Self,
        impl FnOnce(&mut WriteContext<'_>) -> Result<u64, TurnstileError> + Send + 'static,
    ) {
        let (release, wait) = mpsc::channel::<()>();
        let (entered_tx, entered_rx) = oneshot::channel();

        let op = move |ctx: &mut WriteContext<'_>| {
            let _ = entered_tx.send(ctx.sequence());
            // Err means the Gate was dropped, which also releases.
            let _ = wait.recv();
            Ok(ctx.sequence())
        };

        let gate = Self {
            release,
            entered: Some(entered_rx),
        };
        (gate, op)
    }

    /// Wait until the writer thread is inside the gate operation.
    ///
    /// Returns the operation's sequence number. Subsequent calls return
    /// immediately with `None`.
    pub async fn entered(&mut self) -> Option<u64> {
        match self.entered.take() {
            Some(rx) => rx.await.ok(),
            None => None,
        }
    }

    /// Let the writer continue.
    pub fn open(self) {
        let _ = self.release.send(());
    }
}
