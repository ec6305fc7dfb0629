/*
 * testing.rs
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

//! Test support: an `AsyncRead` that replays a script of reads.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// Yields the scripted chunks one read at a time (a chunk larger than the caller's buffer is
/// spread over several reads). After the script: end of stream, or pending forever.
pub struct ScriptedReader {
    chunks: VecDeque<Vec<u8>>,
    pending_at_end: bool,
}

impl ScriptedReader {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().filter(|c| !c.is_empty()).collect(),
            pending_at_end: false,
        }
    }

    /// Never signal end of stream; reads after the script stay pending.
    pub fn pending_at_end(mut self) -> Self {
        self.pending_at_end = true;
        self
    }

    /// Split `data` at the given offsets (ascending) into a script.
    pub fn split_at(data: &[u8], offsets: &[usize]) -> Self {
        let mut chunks = Vec::new();
        let mut start = 0;
        for &off in offsets {
            chunks.push(data[start..off].to_vec());
            start = off;
        }
        chunks.push(data[start..].to_vec());
        Self::new(chunks)
    }
}

impl AsyncRead for ScriptedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let pending_at_end = self.pending_at_end;
        match self.chunks.front_mut() {
            Some(front) => {
                let n = front.len().min(buf.remaining());
                buf.put_slice(&front[..n]);
                front.drain(..n);
                if front.is_empty() {
                    self.chunks.pop_front();
                }
                Poll::Ready(Ok(()))
            }
            None if pending_at_end => Poll::Pending,
            None => Poll::Ready(Ok(())),
        }
    }
}
