/*
 * client.rs
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

//! HTTP client for a single remote endpoint.
//!
//! Each `send` runs resolve → connect → send → read header → read body under one deadline and
//! always yields a `Response`: transfer failures become a synthesized 408 (timeout) or 400
//! (anything else) with a JSON diagnostic body. The connection is kept only while the peer
//! asks for it with a Connection directive other than `close`.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio_rustls::rustls::client::ResolvesClientCert;
use tokio_rustls::rustls::ClientConfig;

use crate::config::HttpClientConfig;
use crate::net::{http_client_config, CertificateValidator, TlsOptions};
use crate::protocol::http::connection::Connection;
use crate::protocol::http::deadline::{CancelToken, Deadline, TransferPhase};
use crate::protocol::http::error::TransferError;
use crate::protocol::http::h1::{parse_head, read_body, read_head, select_framing, Framing};
use crate::protocol::http::handler::{Observers, TransferObserver};
use crate::protocol::http::request::{Method, Request, RequestBuilder};
use crate::protocol::http::resolver::{AddressResolver, DnsClient, SystemDnsClient};
use crate::protocol::http::response::Response;

/// Per-call inputs that are not part of the request itself.
#[derive(Debug, Clone, Default)]
pub struct TransferAttempt {
    /// Caller's retry count, copied into the response. The client never retries on its own.
    pub retry_counter: u32,
    pub cancel: Option<CancelToken>,
}

impl TransferAttempt {
    pub fn new(retry_counter: u32) -> Self {
        Self {
            retry_counter,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Result of a successful exchange on a connection.
struct Exchange {
    response: Response,
    retain: bool,
}

/// HTTP/1.1 client bound to one host. Requests on one client are strictly sequential (`&mut self`).
pub struct HttpClient {
    config: HttpClientConfig,
    resolver: AddressResolver,
    connection: Option<Connection>,
    observers: Observers,
    tls: TlsOptions,
    tls_config: Option<Arc<ClientConfig>>,
    phase: TransferPhase,
    in_flight: bool,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Self {
        Self {
            config,
            resolver: AddressResolver::new(Arc::new(SystemDnsClient)),
            connection: None,
            observers: Observers::new(),
            tls: TlsOptions::default(),
            tls_config: None,
            phase: TransferPhase::Idle,
            in_flight: false,
        }
    }

    /// Use another DNS client for A/AAAA lookups.
    pub fn with_dns(mut self, dns: Arc<dyn DnsClient>) -> Self {
        self.resolver = AddressResolver::new(dns);
        self
    }

    /// Accept server certificates by callback instead of the platform root store.
    pub fn with_certificate_validator(mut self, validator: impl CertificateValidator + 'static) -> Self {
        self.tls.validator = Some(Arc::new(validator));
        self.tls_config = None;
        self
    }

    /// Present a client certificate chosen by `resolver` when the server asks for one.
    pub fn with_client_cert_resolver(mut self, resolver: Arc<dyn ResolvesClientCert>) -> Self {
        self.tls.client_cert = Some(resolver);
        self.tls_config = None;
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn TransferObserver>) {
        self.observers.push(observer);
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Current state of the transfer state machine.
    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Address the next connect will use without asking DNS, if any.
    pub fn resolved_address(&self) -> Option<std::net::IpAddr> {
        self.resolver.cached()
    }

    /// Start a request with Host and User-Agent filled in from the config.
    pub fn request(&self, method: Method, path: impl Into<String>) -> RequestBuilder {
        let mut builder = RequestBuilder::new(method, path, self.config.host_header());
        builder.default_header("User-Agent", self.config.user_agent.clone());
        builder
    }

    pub fn get(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::Get, path)
    }

    pub fn post(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::Post, path)
    }

    pub fn put(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::Put, path)
    }

    pub fn delete(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::Delete, path)
    }

    pub fn head(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::Head, path)
    }

    pub fn options(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::Options, path)
    }

    pub fn patch(&self, path: impl Into<String>) -> RequestBuilder {
        self.request(Method::Patch, path)
    }

    pub async fn send(&mut self, request: &Request) -> Response {
        self.send_attempt(request, TransferAttempt::default()).await
    }

    /// Run one transfer. Never fails: errors come back as synthesized responses.
    pub async fn send_attempt(&mut self, request: &Request, attempt: TransferAttempt) -> Response {
        if self.in_flight {
            tracing::warn!(phase = %self.phase, "previous transfer was abandoned, discarding connection");
            self.teardown().await;
            self.phase = TransferPhase::Idle;
        }
        self.in_flight = true;

        let deadline = Deadline::after(self.effective_timeout(request)).with_cancel(attempt.cancel.clone());
        let mut response = match self.exchange(request, &deadline).await {
            Ok(exchange) => {
                self.set_phase(TransferPhase::Complete);
                if !exchange.retain {
                    self.teardown().await;
                }
                exchange.response
            }
            Err(err) => {
                let failed_in = self.phase;
                self.set_phase(TransferPhase::Failed);
                self.teardown().await;
                synthesize(&err, failed_in)
            }
        };
        response.retry_counter = attempt.retry_counter;
        response.runtime = deadline.elapsed();

        self.observers.notify("response", |o| o.on_response(request, &response));
        if response.is_error() {
            self.observers.notify("http_error", |o| o.on_http_error(request, &response));
        }
        self.set_phase(TransferPhase::Idle);
        self.in_flight = false;
        response
    }

    /// Close the connection, if any. The next request resolves and connects again.
    pub async fn close(&mut self) {
        self.teardown().await;
    }

    fn effective_timeout(&self, request: &Request) -> Duration {
        let default = self.config.default_timeout;
        request.timeout().map_or(default, |t| t.min(default))
    }

    fn set_phase(&mut self, next: TransferPhase) {
        if self.phase != next {
            tracing::debug!(from = %self.phase, to = %next, "transfer phase");
            self.phase = next;
        }
    }

    async fn teardown(&mut self) {
        if let Some(connection) = self.connection.take() {
            tracing::debug!(remote = %connection.remote_addr(), "closing connection");
            connection.shutdown().await;
        }
        self.resolver.clear();
    }

    fn tls_config(&mut self) -> Result<Arc<ClientConfig>, TransferError> {
        if let Some(config) = &self.tls_config {
            return Ok(config.clone());
        }
        let config = http_client_config(&self.tls).map_err(|e| TransferError::Connect {
            target: format!("{}:{}", self.config.host, self.config.port),
            source: e,
        })?;
        self.tls_config = Some(config.clone());
        Ok(config)
    }

    /// Reuse the live connection or open a new one, then run the exchange on it. The connection
    /// is put back only when the exchange succeeded and the response allows reuse.
    async fn exchange(&mut self, request: &Request, deadline: &Deadline) -> Result<Exchange, TransferError> {
        let mut connection = match self.connection.take() {
            Some(connection) => {
                tracing::debug!(remote = %connection.remote_addr(), "reusing connection");
                connection
            }
            None => self.connect(deadline).await?,
        };
        match self.exchange_on(&mut connection, request, deadline).await {
            Ok(exchange) => {
                if exchange.retain {
                    self.connection = Some(connection);
                } else {
                    connection.shutdown().await;
                }
                Ok(exchange)
            }
            Err(err) => {
                connection.shutdown().await;
                Err(err)
            }
        }
    }

    async fn connect(&mut self, deadline: &Deadline) -> Result<Connection, TransferError> {
        self.set_phase(TransferPhase::Resolving);
        let ip = match deadline.check(self.resolver.resolve(&self.config.host)).await {
            Ok(result) => result?,
            Err(interrupt) => {
                return Err(TransferError::interrupted(
                    interrupt,
                    TransferPhase::Resolving,
                    deadline.elapsed(),
                ))
            }
        };

        self.set_phase(TransferPhase::Connecting);
        let tls = if self.config.use_tls {
            Some(self.tls_config()?)
        } else {
            None
        };
        Connection::open(&self.config.host, ip, self.config.port, tls, deadline).await
    }

    async fn exchange_on(
        &mut self,
        connection: &mut Connection,
        request: &Request,
        deadline: &Deadline,
    ) -> Result<Exchange, TransferError> {
        self.set_phase(TransferPhase::Sending);
        self.observers.notify("request", |o| o.on_request(request));
        connection.transmit(request, deadline).await?;

        self.set_phase(TransferPhase::AwaitingHeader);
        let scratch_size = self.config.scratch_size;
        let mut seed = BytesMut::new();
        let (mut response, prefix) = loop {
            let framed = read_head(
                connection.stream(),
                seed,
                deadline,
                scratch_size,
                self.config.max_header_bytes,
            )
            .await?;
            let head = parse_head(&framed.header)?;
            // Interim responses precede the real one on the same stream.
            if (100..200).contains(&head.code) && head.code != 101 {
                tracing::debug!(code = head.code, "skipping interim response");
                seed = framed.prefix;
                continue;
            }
            break (head, framed.prefix);
        };

        self.set_phase(TransferPhase::ReadingBody);
        let framing = select_framing(request.method(), &response);
        tracing::debug!(code = response.code, ?framing, "response header received");
        let body = read_body(
            connection.stream(),
            framing,
            prefix,
            deadline,
            scratch_size,
            &self.observers,
        )
        .await?;

        let retain = response.keep_alive()
            && response.code != 101
            && framing != Framing::UntilClose
            && !body.truncated
            && !body.peer_closed
            && !body.desynced;
        response.body = body.bytes;
        response.truncated = body.truncated;
        response.local_addr = Some(connection.local_addr());
        response.remote_addr = Some(connection.remote_addr());
        Ok(Exchange { response, retain })
    }
}

/// Turn a transfer error into a response: 408 for timeouts, 400 for everything else.
fn synthesize(err: &TransferError, phase: TransferPhase) -> Response {
    let (mut response, body) = match err {
        TransferError::Timeout { elapsed, .. } => (
            Response::with_reason(408, "Request Timeout"),
            serde_json::json!({
                "message": err.to_string(),
                "stackTrace": err.chain(),
                "timeout": u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            }),
        ),
        _ => (
            Response::with_reason(400, "Bad Request"),
            serde_json::json!({
                "message": err.innermost().to_string(),
                "stackTrace": format!("{}\nphase: {}", err.chain(), phase),
            }),
        ),
    };
    tracing::error!(code = response.code, %phase, error = %err, "transfer failed");
    let body = Bytes::from(body.to_string());
    response.headers = vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Content-Length".to_string(), body.len().to_string()),
        ("Connection".to_string(), "close".to_string()),
    ];
    response.body = body;
    response.synthesized = true;
    response
}
