/*
 * deadline.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Postiglione, a networking toolkit.
 *
 * Postiglione is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Postiglione is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Postiglione.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Transfer phases, the per-attempt deadline and the cancellation token.
//!
//! Every blocking step of a transfer (connect, handshake, write, read) runs through
//! `Deadline::check`, which races the step against the deadline and the cancel signal.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Stand-in for "no deadline" when a timeout does not fit in an `Instant` (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// State of the per-request state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Idle,
    Resolving,
    Connecting,
    Sending,
    AwaitingHeader,
    ReadingBody,
    Complete,
    Failed,
}

impl TransferPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferPhase::Idle => "idle",
            TransferPhase::Resolving => "resolving",
            TransferPhase::Connecting => "connecting",
            TransferPhase::Sending => "sending",
            TransferPhase::AwaitingHeader => "awaiting header",
            TransferPhase::ReadingBody => "reading body",
            TransferPhase::Complete => "complete",
            TransferPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cancellation signal for a transfer. Clones share the same flag; once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called (immediately if it already was).
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so wait_for cannot fail while we borrow it.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a checkpoint gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Elapsed,
    Cancelled,
}

/// Absolute deadline of one transfer attempt plus its stopwatch and optional cancel token.
#[derive(Debug, Clone)]
pub struct Deadline {
    started: Instant,
    at: Instant,
    cancel: Option<CancelToken>,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        let started = Instant::now();
        let at = started
            .checked_add(timeout.min(FAR_FUTURE))
            .unwrap_or(started);
        Self {
            started,
            at,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Option<CancelToken>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Run one blocking step, giving up when the deadline passes or the token is cancelled.
    /// Cancellation wins over a step that is ready at the same instant.
    pub async fn check<F, T>(&self, step: F) -> Result<T, Interrupt>
    where
        F: Future<Output = T>,
    {
        if self.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        let sleep = tokio::time::sleep_until(self.at);
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(Interrupt::Cancelled),
                out = step => Ok(out),
                _ = sleep => Err(Interrupt::Elapsed),
            },
            None => tokio::select! {
                biased;
                out = step => Ok(out),
                _ = sleep => Err(Interrupt::Elapsed),
            },
        }
    }
}
