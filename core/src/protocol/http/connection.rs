/*
 * connection.rs
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

//! HTTP connection: one TCP stream, optionally wrapped in TLS, to a single resolved address.
//! Opens the stream, writes requests onto it and shuts it down.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as TokioTlsStream;
use tokio_rustls::rustls::ClientConfig;

use crate::net::handshake;
use crate::protocol::http::deadline::{Deadline, TransferPhase};
use crate::protocol::http::error::TransferError;
use crate::protocol::http::request::Request;

/// Upper bound for the TLS close_notify / FIN on a connection being discarded.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Stream a connection reads and writes: plain TCP or TLS over TCP.
pub enum HttpStream {
    Plain(TcpStream),
    Tls(Box<TokioTlsStream<TcpStream>>),
}

trait ByteStream: AsyncRead + AsyncWrite + Unpin {}

impl<T: AsyncRead + AsyncWrite + Unpin> ByteStream for T {}

impl HttpStream {
    pub fn is_tls(&self) -> bool {
        matches!(self, HttpStream::Tls(_))
    }

    fn inner(self: Pin<&mut Self>) -> Pin<&mut dyn ByteStream> {
        match self.get_mut() {
            HttpStream::Plain(tcp) => Pin::new(tcp as &mut dyn ByteStream),
            HttpStream::Tls(tls) => Pin::new(tls.as_mut() as &mut dyn ByteStream),
        }
    }
}

impl AsyncRead for HttpStream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        self.inner().poll_read(cx, buf)
    }
}

impl AsyncWrite for HttpStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.inner().poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner().poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.inner().poll_shutdown(cx)
    }
}

/// Live connection owned by one client.
pub struct Connection {
    stream: HttpStream,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
}

impl Connection {
    /// Open a connection to `ip:port`. With a TLS config the handshake is made against `host`;
    /// a failed handshake drops the socket and the whole sequence is tried once more.
    pub async fn open(
        host: &str,
        ip: IpAddr,
        port: u16,
        tls: Option<Arc<ClientConfig>>,
        deadline: &Deadline,
    ) -> Result<Connection, TransferError> {
        let remote = SocketAddr::new(ip, port);
        let Some(config) = tls else {
            let tcp = Self::tcp(remote, deadline).await?;
            return Self::from_stream(HttpStream::Plain(tcp));
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let tcp = Self::tcp(remote, deadline).await?;
            let result = deadline.check(handshake(config.clone(), host, tcp)).await;
            match result {
                Ok(Ok(tls)) => {
                    tracing::debug!(host, %remote, attempt, "TLS handshake complete");
                    return Self::from_stream(HttpStream::Tls(Box::new(tls)));
                }
                Ok(Err(e)) if attempt < 2 => {
                    tracing::warn!(host, %remote, error = %e, "TLS handshake failed, retrying");
                }
                Ok(Err(e)) => {
                    return Err(TransferError::Connect {
                        target: format!("{}:{}", host, port),
                        source: e,
                    });
                }
                Err(interrupt) => {
                    return Err(TransferError::interrupted(
                        interrupt,
                        TransferPhase::Connecting,
                        deadline.elapsed(),
                    ));
                }
            }
        }
    }

    async fn tcp(remote: SocketAddr, deadline: &Deadline) -> Result<TcpStream, TransferError> {
        match deadline.check(TcpStream::connect(remote)).await {
            Ok(Ok(tcp)) => {
                // Requests are written in one go; don't hold back the tail.
                let _ = tcp.set_nodelay(true);
                tracing::debug!(%remote, "TCP connected");
                Ok(tcp)
            }
            Ok(Err(e)) => Err(TransferError::Connect {
                target: remote.to_string(),
                source: e,
            }),
            Err(interrupt) => Err(TransferError::interrupted(
                interrupt,
                TransferPhase::Connecting,
                deadline.elapsed(),
            )),
        }
    }

    fn from_stream(stream: HttpStream) -> Result<Connection, TransferError> {
        let tcp = match &stream {
            HttpStream::Plain(s) => s,
            HttpStream::Tls(s) => s.get_ref().0,
        };
        let local_addr = tcp.local_addr()?;
        let remote_addr = tcp.peer_addr()?;
        Ok(Connection {
            stream,
            local_addr,
            remote_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }

    pub fn stream(&mut self) -> &mut HttpStream {
        &mut self.stream
    }

    /// Write the request head and then the body bytes to be sent, and flush.
    pub async fn transmit(&mut self, request: &Request, deadline: &Deadline) -> Result<(), TransferError> {
        write_request(&mut self.stream, request, deadline).await
    }

    /// Close the write side; errors are ignored since the connection is being discarded.
    pub async fn shutdown(mut self) {
        match tokio::time::timeout(SHUTDOWN_GRACE, self.stream.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::trace!(error = %e, "shutdown failed"),
            Err(_) => tracing::trace!("shutdown timed out"),
        }
    }
}

/// Serialize `request` onto `stream`: head first, then `Request::wire_body`.
pub async fn write_request<W>(stream: &mut W, request: &Request, deadline: &Deadline) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin,
{
    let head = request.head_bytes();
    let body = request.wire_body();
    let write = async {
        stream.write_all(&head).await?;
        if !body.is_empty() {
            stream.write_all(body).await?;
        }
        stream.flush().await
    };
    match deadline.check(write).await {
        Ok(Ok(())) => {
            tracing::trace!(head = head.len(), body = body.len(), "request written");
            Ok(())
        }
        Ok(Err(e)) => Err(TransferError::Transport(e)),
        Err(interrupt) => Err(TransferError::interrupted(
            interrupt,
            TransferPhase::Sending,
            deadline.elapsed(),
        )),
    }
}
