/*
 * response.rs
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

//! HTTP response: status, headers, body and transfer metadata.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;

/// Completed HTTP response, either received from the peer or synthesized from a transfer failure.
#[derive(Debug, Clone)]
pub struct Response {
    pub code: u16,
    pub reason: Option<String>,
    /// Protocol token from the status line, e.g. "HTTP/1.1".
    pub version: String,
    /// Header fields in received order. Names may repeat.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// True when the body stopped short of its framing (deadline or early close).
    pub truncated: bool,
    /// True when the response was produced locally from a transfer error.
    pub synthesized: bool,
    /// Retry counter the caller passed in with the attempt.
    pub retry_counter: u32,
    /// Wall time from the start of the attempt until the response was complete.
    pub runtime: Duration,
    pub local_addr: Option<SocketAddr>,
    pub remote_addr: Option<SocketAddr>,
}

impl Response {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            reason: None,
            version: "HTTP/1.1".to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
            truncated: false,
            synthesized: false,
            retry_counter: 0,
            runtime: Duration::ZERO,
            local_addr: None,
            remote_addr: None,
        }
    }

    pub fn with_reason(code: u16, reason: impl Into<String>) -> Self {
        let mut r = Self::new(code);
        r.reason = Some(reason.into());
        r
    }

    /// First header with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }

    /// Transfer-Encoding token, lowercased and trimmed.
    pub fn transfer_encoding(&self) -> Option<String> {
        self.header("transfer-encoding").map(|v| v.trim().to_ascii_lowercase())
    }

    /// Connection directive, lowercased and trimmed.
    pub fn connection(&self) -> Option<String> {
        self.header("connection").map(|v| v.trim().to_ascii_lowercase())
    }

    /// Whether the connection may be kept for the next request. A missing directive means close.
    pub fn keep_alive(&self) -> bool {
        match self.connection() {
            Some(directive) => directive != "close",
            None => false,
        }
    }

    pub fn is_error(&self) -> bool {
        self.code >= 400
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
