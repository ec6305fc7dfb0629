/*
 * request.rs
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

//! HTTP request: method, path, host, headers, optional body.
//!
//! Built via RequestBuilder; the finished `Request` is immutable and handed to the client.

use std::time::Duration;

use bytes::Bytes;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Other(&'static str),
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Other(s) => s,
        }
    }
}

/// Immutable HTTP request as consumed by the transfer engine.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    host: String,
    /// Header fields other than Host and Content-Length, in insertion order.
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    content_length: Option<u64>,
    timeout: Option<Duration>,
}

impl Request {
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Value of the Host header.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Declared Content-Length; may be smaller than the body, in which case the body is cut.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Per-request timeout. The effective deadline never exceeds the client default.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Body bytes that go on the wire: `min(declared length, body length)`.
    /// Without a declared length the whole body is sent.
    pub fn wire_body(&self) -> &[u8] {
        let Some(body) = &self.body else {
            return &[];
        };
        let limit = self
            .content_length
            .map_or(body.len(), |cl| usize::try_from(cl).unwrap_or(usize::MAX).min(body.len()));
        &body[..limit]
    }

    /// Serialize the request head: request line, Host, headers, Content-Length, blank line.
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\n",
            self.method.as_str(),
            self.path,
            self.host
        );
        for (k, v) in &self.headers {
            head.push_str(k);
            head.push_str(": ");
            head.push_str(v);
            head.push_str("\r\n");
        }
        if let Some(cl) = self.content_length {
            head.push_str(&format!("Content-Length: {}\r\n", cl));
        }
        head.push_str("\r\n");
        head.into_bytes()
    }
}

/// Mutable request builder: method, path, headers, body, timeout.
///
/// Obtain from `HttpClient::request(method, path)` (Host and User-Agent pre-filled) or
/// `RequestBuilder::new`. Call `build()` to get the immutable `Request`.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    pub method: Method,
    pub path: String,
    pub host: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub content_length: Option<u64>,
    pub timeout: Option<Duration>,
}

impl RequestBuilder {
    pub fn new(method: Method, path: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            host: host.into(),
            headers: Vec::new(),
            body: None,
            content_length: None,
            timeout: None,
        }
    }

    /// Add or replace a header. Name comparison is case-insensitive; a replaced header keeps its
    /// original position. Host and Content-Length are routed to their dedicated fields.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        if name.eq_ignore_ascii_case("host") {
            self.host = value;
            return self;
        }
        if name.eq_ignore_ascii_case("content-length") {
            self.content_length = value.trim().parse().ok();
            return self;
        }
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Add a header only when no header of that name is present yet.
    pub fn default_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        if !self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name)) {
            self.headers.push((name.to_string(), value.into()));
        }
        self
    }

    /// Set request body and declare its full length.
    pub fn body(&mut self, data: impl Into<Bytes>) -> &mut Self {
        let data = data.into();
        self.content_length = Some(data.len() as u64);
        self.body = Some(data);
        self
    }

    /// Override the declared Content-Length (set after `body` to send only a prefix).
    pub fn content_length(&mut self, length: u64) -> &mut Self {
        self.content_length = Some(length);
        self
    }

    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(&self) -> Request {
        Request {
            method: self.method,
            path: self.path.clone(),
            host: self.host.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            content_length: self.content_length,
            timeout: self.timeout,
        }
    }
}
