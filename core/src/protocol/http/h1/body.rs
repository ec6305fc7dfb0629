/*
 * body.rs
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

//! Response body materialization: fixed length, chunked, or read until the peer closes.
//!
//! The deadline elapsing while a body is read is not an error: whatever arrived becomes the
//! body and the result is marked truncated. Cancellation and I/O faults are errors.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::protocol::http::deadline::{Deadline, Interrupt, TransferPhase};
use crate::protocol::http::error::TransferError;
use crate::protocol::http::h1::chunked::{ChunkStep, ChunkedDecodeState};
use crate::protocol::http::handler::Observers;
use crate::protocol::http::request::Method;
use crate::protocol::http::response::Response;

/// How the body of a response is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// No body (HEAD, 1xx, 204, 304, Content-Length: 0).
    Empty,
    Fixed(u64),
    Chunked,
    UntilClose,
}

/// Materialized body.
#[derive(Debug, Clone)]
pub struct Body {
    pub bytes: Bytes,
    /// The framing was not satisfied (deadline, or peer closed early).
    pub truncated: bool,
    /// The peer signalled end of stream; the connection cannot be reused.
    pub peer_closed: bool,
    /// The end of the body could not be located exactly, so unread bytes may sit on the stream.
    pub desynced: bool,
}

impl Body {
    fn empty() -> Self {
        Self {
            bytes: Bytes::new(),
            truncated: false,
            peer_closed: false,
            desynced: false,
        }
    }
}

/// Pick the framing for a response head. A positive Content-Length wins over chunked.
pub fn select_framing(method: Method, head: &Response) -> Framing {
    if method == Method::Head || (100..200).contains(&head.code) || head.code == 204 || head.code == 304 {
        return Framing::Empty;
    }
    let chunked = head
        .transfer_encoding()
        .map(|te| te.rsplit(',').next().map(str::trim) == Some("chunked"))
        .unwrap_or(false);
    match head.content_length() {
        Some(cl) if cl > 0 => Framing::Fixed(cl),
        Some(_) if !chunked => Framing::Empty,
        _ if chunked => Framing::Chunked,
        _ => Framing::UntilClose,
    }
}

/// Read the body described by `framing`, starting with the bytes already read past the header.
pub async fn read_body<S>(
    stream: &mut S,
    framing: Framing,
    prefix: BytesMut,
    deadline: &Deadline,
    scratch_size: usize,
    observers: &Observers,
) -> Result<Body, TransferError>
where
    S: AsyncRead + Unpin,
{
    let mut scratch = vec![0u8; scratch_size.max(1)];
    match framing {
        Framing::Empty => Ok(Body::empty()),
        Framing::Fixed(length) => read_fixed(stream, length, prefix, deadline, &mut scratch, observers).await,
        Framing::Chunked => read_chunked(stream, prefix, deadline, &mut scratch, observers).await,
        Framing::UntilClose => read_until_close(stream, prefix, deadline, &mut scratch, observers).await,
    }
}

fn cancelled() -> TransferError {
    TransferError::Cancelled {
        phase: TransferPhase::ReadingBody,
    }
}

async fn read_fixed<S>(
    stream: &mut S,
    length: u64,
    mut prefix: BytesMut,
    deadline: &Deadline,
    scratch: &mut [u8],
    observers: &Observers,
) -> Result<Body, TransferError>
where
    S: AsyncRead + Unpin,
{
    let length_usize = usize::try_from(length).unwrap_or(usize::MAX);
    if prefix.len() > length_usize {
        prefix.truncate(length_usize);
    }
    let mut body = prefix;
    let mut remaining = length - body.len() as u64;
    let mut truncated = false;
    let mut peer_closed = false;
    if !body.is_empty() {
        let received = body.len() as u64;
        observers.notify("data_read", |o| o.on_data_read(received, Some(length)));
    }
    while remaining > 0 {
        let want = scratch.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        match deadline.check(stream.read(&mut scratch[..want])).await {
            Ok(Ok(0)) => {
                tracing::warn!(received = body.len(), expected = length, "connection closed before end of body");
                truncated = true;
                peer_closed = true;
                break;
            }
            Ok(Ok(n)) => {
                body.extend_from_slice(&scratch[..n]);
                remaining -= n as u64;
                let received = body.len() as u64;
                observers.notify("data_read", |o| o.on_data_read(received, Some(length)));
            }
            Ok(Err(e)) => return Err(TransferError::Transport(e)),
            Err(Interrupt::Elapsed) => {
                tracing::warn!(received = body.len(), expected = length, "deadline elapsed, body truncated");
                truncated = true;
                break;
            }
            Err(Interrupt::Cancelled) => return Err(cancelled()),
        }
    }
    Ok(Body {
        bytes: body.freeze(),
        truncated,
        peer_closed,
        desynced: false,
    })
}

async fn read_chunked<S>(
    stream: &mut S,
    prefix: BytesMut,
    deadline: &Deadline,
    scratch: &mut [u8],
    observers: &Observers,
) -> Result<Body, TransferError>
where
    S: AsyncRead + Unpin,
{
    let mut state = ChunkedDecodeState::new(prefix);
    let mut truncated = false;
    let mut peer_closed = false;
    loop {
        let step = state.decode(|chunk, len, total| {
            observers.notify("chunk_data_read", |o| o.on_chunk_data_read(chunk, len, total));
        });
        if step == ChunkStep::Finished {
            break;
        }
        match deadline.check(stream.read(scratch)).await {
            Ok(Ok(0)) => {
                tracing::warn!(decoded = state.decoded_len(), "connection closed inside chunked body");
                truncated = true;
                peer_closed = true;
                break;
            }
            Ok(Ok(n)) => {
                tracing::trace!(bytes = n, "read chunked bytes");
                state.feed(&scratch[..n]);
            }
            Ok(Err(e)) => return Err(TransferError::Transport(e)),
            Err(Interrupt::Elapsed) => {
                tracing::warn!(
                    decoded = state.decoded_len(),
                    chunks = state.chunks(),
                    "timeout while decoding chunked body"
                );
                truncated = true;
                break;
            }
            Err(Interrupt::Cancelled) => return Err(cancelled()),
        }
    }
    let desynced = state.is_desynced();
    Ok(Body {
        bytes: state.into_body(),
        truncated,
        peer_closed,
        desynced,
    })
}

async fn read_until_close<S>(
    stream: &mut S,
    prefix: BytesMut,
    deadline: &Deadline,
    scratch: &mut [u8],
    observers: &Observers,
) -> Result<Body, TransferError>
where
    S: AsyncRead + Unpin,
{
    let mut body = prefix;
    let mut truncated = false;
    let mut peer_closed = false;
    if !body.is_empty() {
        let received = body.len() as u64;
        observers.notify("data_read", |o| o.on_data_read(received, None));
    }
    loop {
        match deadline.check(stream.read(scratch)).await {
            Ok(Ok(0)) => {
                peer_closed = true;
                break;
            }
            Ok(Ok(n)) => {
                body.extend_from_slice(&scratch[..n]);
                let received = body.len() as u64;
                observers.notify("data_read", |o| o.on_data_read(received, None));
            }
            Ok(Err(e)) => return Err(TransferError::Transport(e)),
            Err(Interrupt::Elapsed) => {
                tracing::warn!(received = body.len(), "deadline elapsed before peer closed");
                truncated = true;
                break;
            }
            Err(Interrupt::Cancelled) => return Err(cancelled()),
        }
    }
    Ok(Body {
        bytes: body.freeze(),
        truncated,
        peer_closed,
        desynced: false,
    })
}
