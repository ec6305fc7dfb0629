/*
 * framer.rs
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

//! Response framing: read until the CRLFCRLF header terminator and split off the header block.
//! Bytes already read past the terminator are handed on as the body prefix.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::protocol::http::deadline::{Deadline, Interrupt, TransferPhase};
use crate::protocol::http::error::TransferError;

pub const HEADER_TERMINATOR: &[u8; 4] = b"\r\n\r\n";

/// Header block (without terminator) and body bytes read ahead of time.
#[derive(Debug)]
pub struct FramedHead {
    pub header: Bytes,
    pub prefix: BytesMut,
}

/// Position of the first `\r\n\r\n` in buf.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

/// Read from `stream` until the header terminator is found.
///
/// `seed` holds bytes already received on this connection (e.g. after an interim 1xx response).
/// The deadline elapsing before any byte arrived is a timeout; elapsing afterwards, or the peer
/// closing mid-header, means the header end could not be found.
pub async fn read_head<S>(
    stream: &mut S,
    seed: BytesMut,
    deadline: &Deadline,
    scratch_size: usize,
    max_header_bytes: usize,
) -> Result<FramedHead, TransferError>
where
    S: AsyncRead + Unpin,
{
    let mut acc = seed;
    let mut scratch = vec![0u8; scratch_size.max(1)];
    // Everything before `scanned` is known not to start a terminator.
    let mut scanned = 0usize;
    loop {
        if let Some(pos) = find_header_end(&acc[scanned..]) {
            let end = scanned + pos;
            let mut header = acc.split_to(end + HEADER_TERMINATOR.len());
            header.truncate(end);
            return Ok(FramedHead {
                header: header.freeze(),
                prefix: acc,
            });
        }
        // Keep three bytes of context so a terminator split across reads is still found.
        scanned = acc.len().saturating_sub(HEADER_TERMINATOR.len() - 1);
        if acc.len() > max_header_bytes {
            return Err(TransferError::MalformedResponse(format!(
                "response header exceeds {} bytes",
                max_header_bytes
            )));
        }

        let n = match deadline.check(stream.read(&mut scratch)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(TransferError::Transport(e)),
            Err(Interrupt::Elapsed) if acc.is_empty() => {
                return Err(TransferError::Timeout {
                    phase: TransferPhase::AwaitingHeader,
                    elapsed: deadline.elapsed(),
                });
            }
            Err(Interrupt::Elapsed) => {
                return Err(TransferError::MalformedResponse(
                    "could not find end of header".to_string(),
                ));
            }
            Err(Interrupt::Cancelled) => {
                return Err(TransferError::Cancelled {
                    phase: TransferPhase::AwaitingHeader,
                });
            }
        };
        if n == 0 {
            if acc.is_empty() {
                return Err(TransferError::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before response",
                )));
            }
            return Err(TransferError::MalformedResponse(
                "could not find end of header".to_string(),
            ));
        }
        tracing::trace!(bytes = n, "read header bytes");
        acc.extend_from_slice(&scratch[..n]);
    }
}
