/*
 * handler.rs
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

//! Transfer observers: synchronous callbacks at fixed checkpoints of a transfer.
//!
//! Events: request → data_read (×n) / chunk_data_read (×n) → response → http_error (status >= 400
//! or synthesized failure).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::protocol::http::request::Request;
use crate::protocol::http::response::Response;

/// Observer for transfer events. All methods default to no-ops; implement the ones you need.
///
/// Callbacks run on the transfer task, in registration order, and must not block.
/// A panicking observer is logged and skipped; the transfer continues.
pub trait TransferObserver: Send + Sync {
    /// Called just before the request head is written.
    fn on_request(&self, _request: &Request) {}

    /// Called after each drain pass of a fixed-length or read-to-close body.
    /// `expected` is the Content-Length when known.
    fn on_data_read(&self, _received: u64, _expected: Option<u64>) {}

    /// Called after each chunk of a chunked body is decoded. `chunk` is 1-based.
    fn on_chunk_data_read(&self, _chunk: u32, _chunk_len: usize, _decoded_total: u64) {}

    /// Called with the final response, received or synthesized.
    fn on_response(&self, _request: &Request, _response: &Response) {}

    /// Called when the final response is an error (status >= 400 or synthesized).
    fn on_http_error(&self, _request: &Request, _response: &Response) {}
}

/// Ordered observer list owned by a client.
#[derive(Clone, Default)]
pub struct Observers {
    list: Vec<Arc<dyn TransferObserver>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observer: Arc<dyn TransferObserver>) {
        self.list.push(observer);
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Invoke `event` on every observer in order, isolating panics.
    pub fn notify(&self, event: &'static str, f: impl Fn(&dyn TransferObserver)) {
        for (index, observer) in self.list.iter().enumerate() {
            let result = catch_unwind(AssertUnwindSafe(|| f(observer.as_ref())));
            if result.is_err() {
                tracing::warn!(observer = index, event, "transfer observer panicked");
            }
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers").field("len", &self.list.len()).finish()
    }
}
