/*
 * error.rs
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

//! Transfer errors. The client never returns these to callers; it turns them into synthesized
//! responses (408 for timeouts, 400 otherwise).

use std::error::Error;
use std::io;
use std::time::Duration;

use crate::protocol::http::deadline::{Interrupt, TransferPhase};

/// Errors raised while resolving, connecting, sending or reading a response.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// No usable address for the host.
    #[error("could not resolve {host}: {reason}")]
    AddressResolution { host: String, reason: String },

    /// TCP connect or TLS handshake failed (after the single handshake retry).
    #[error("could not connect to {target}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Deadline elapsed before the response header arrived.
    #[error("timeout after {} ms while {phase}", .elapsed.as_millis())]
    Timeout {
        phase: TransferPhase,
        elapsed: Duration,
    },

    /// Response framing could not be recognised.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Transfer cancelled through its token.
    #[error("transfer cancelled while {phase}")]
    Cancelled { phase: TransferPhase },

    /// Any other I/O fault on the stream.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

impl TransferError {
    pub(crate) fn interrupted(interrupt: Interrupt, phase: TransferPhase, elapsed: Duration) -> Self {
        match interrupt {
            Interrupt::Elapsed => TransferError::Timeout { phase, elapsed },
            Interrupt::Cancelled => TransferError::Cancelled { phase },
        }
    }

    /// Innermost cause in the `source()` chain (self when there is none).
    pub fn innermost(&self) -> &(dyn Error + 'static) {
        let mut current: &(dyn Error + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }

    /// Every error in the chain, outermost first, one per line.
    pub fn chain(&self) -> String {
        let mut lines = vec![self.to_string()];
        let mut current = self.source();
        while let Some(err) = current {
            lines.push(format!("caused by: {}", err));
            current = err.source();
        }
        lines.join("\n")
    }
}
