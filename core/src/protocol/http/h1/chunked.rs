/*
 * chunked.rs
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

//! Chunked transfer-encoding decoder over an accumulating raw buffer.
//!
//! Grammar: `<hex-size>[;ext]\r\n<size bytes>\r\n` repeated, ended by a zero-size chunk.
//! The zero-size chunk is followed by optional trailer lines and an empty line; trailers are
//! discarded. A size line that does not parse as hex, or a size that cannot be addressed, ends
//! the body early and leaves the decoder out of step with the stream.

use bytes::{Bytes, BytesMut};

use crate::protocol::http::h1::parser::find_crlf;

/// Outcome of one decode pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStep {
    /// The buffered bytes end inside a size line or chunk; feed more.
    NeedMore,
    /// The body ended: the zero-size chunk and trailer section were consumed, or decoding gave up.
    Finished,
}

/// Parse a chunk-size line, ignoring chunk extensions. None when it is not a hex number.
pub fn parse_chunk_size(line: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(line).ok()?;
    let hex = text.split(';').next().unwrap_or(text).trim();
    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    usize::from_str_radix(hex, 16).ok()
}

/// Decoder state: raw bytes not yet consumed, scan cursor, chunk count and decoded body.
///
/// `position()` and `boundary()` are absolute offsets into the raw stream and never decrease.
#[derive(Debug, Default)]
pub struct ChunkedDecodeState {
    raw: BytesMut,
    /// Bytes dropped from the front of `raw` so far.
    base: usize,
    /// Scan cursor relative to `raw`.
    cursor: usize,
    /// Absolute offset just past the last complete chunk.
    boundary: usize,
    chunk_no: u32,
    decoded: BytesMut,
    /// The zero-size chunk was seen; reading trailer lines.
    in_trailer: bool,
    finished: bool,
    desynced: bool,
}

impl ChunkedDecodeState {
    /// Start decoding with body bytes that were read together with the header.
    pub fn new(prefix: BytesMut) -> Self {
        Self {
            raw: prefix,
            ..Self::default()
        }
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.raw.extend_from_slice(data);
    }

    pub fn position(&self) -> usize {
        self.base + self.cursor
    }

    pub fn boundary(&self) -> usize {
        self.boundary
    }

    /// Number of non-empty chunks decoded so far.
    pub fn chunks(&self) -> u32 {
        self.chunk_no
    }

    pub fn decoded_len(&self) -> usize {
        self.decoded.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decoding stopped somewhere other than the end of the trailer section, or bytes followed it.
    /// The stream position is unknown and the connection must not be reused.
    pub fn is_desynced(&self) -> bool {
        self.desynced
    }

    /// Decode every complete chunk currently buffered. `on_chunk(chunk_no, chunk_len, decoded_total)`
    /// runs after each chunk is appended to the body.
    pub fn decode(&mut self, mut on_chunk: impl FnMut(u32, usize, u64)) -> ChunkStep {
        loop {
            if self.finished {
                return ChunkStep::Finished;
            }
            let Some(line_len) = find_crlf(&self.raw[self.cursor..]) else {
                return ChunkStep::NeedMore;
            };
            if self.in_trailer {
                self.cursor += line_len + 2;
                if line_len == 0 {
                    self.finished = true;
                    if self.cursor < self.raw.len() {
                        tracing::warn!(extra = self.raw.len() - self.cursor, "bytes after end of chunked body");
                        self.desynced = true;
                    }
                    return ChunkStep::Finished;
                }
                self.compact();
                continue;
            }
            let line = &self.raw[self.cursor..self.cursor + line_len];
            let Some(size) = parse_chunk_size(line) else {
                tracing::warn!(
                    line = %String::from_utf8_lossy(line),
                    chunk = self.chunk_no + 1,
                    "invalid chunk size, treating as last chunk"
                );
                return self.give_up();
            };
            let data_start = self.cursor + line_len + 2;
            if size == 0 {
                self.cursor = data_start;
                self.in_trailer = true;
                continue;
            }
            let Some(chunk_end) = data_start.checked_add(size).and_then(|end| end.checked_add(2)) else {
                tracing::warn!(size, "chunk size overflows, treating as last chunk");
                return self.give_up();
            };
            let data_end = chunk_end - 2;
            if self.raw.len() < chunk_end {
                return ChunkStep::NeedMore;
            }
            if &self.raw[data_end..chunk_end] != b"\r\n" {
                tracing::warn!(chunk = self.chunk_no + 1, "chunk data not followed by CRLF");
            }
            self.decoded.extend_from_slice(&self.raw[data_start..data_end]);
            self.chunk_no += 1;
            self.cursor = chunk_end;
            self.boundary = self.base + self.cursor;
            on_chunk(self.chunk_no, size, self.decoded.len() as u64);
            self.compact();
        }
    }

    fn give_up(&mut self) -> ChunkStep {
        self.finished = true;
        self.desynced = true;
        ChunkStep::Finished
    }

    /// Drop consumed raw bytes so the buffer only holds the undecoded tail.
    fn compact(&mut self) {
        let _ = self.raw.split_to(self.cursor);
        self.base += self.cursor;
        self.cursor = 0;
    }

    /// Decoded body so far (complete once `decode` returned `Finished`).
    pub fn into_body(self) -> Bytes {
        self.decoded.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIKI: &[u8] = b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";

    fn decode_all(parts: &[&[u8]]) -> (ChunkStep, Bytes) {
        let mut state = ChunkedDecodeState::new(BytesMut::new());
        let mut step = ChunkStep::NeedMore;
        for part in parts {
            state.feed(part);
            step = state.decode(|_, _, _| {});
        }
        (step, state.into_body())
    }

    #[test]
    fn wikipedia_example() {
        let (step, body) = decode_all(&[WIKI]);
        assert_eq!(step, ChunkStep::Finished);
        assert_eq!(&body[..], b"Wikipedia");
    }

    #[test]
    fn every_two_way_split() {
        for split in 0..=WIKI.len() {
            let (step, body) = decode_all(&[&WIKI[..split], &WIKI[split..]]);
            assert_eq!(step, ChunkStep::Finished, "split {}", split);
            assert_eq!(&body[..], b"Wikipedia", "split {}", split);
        }
    }

    #[test]
    fn split_at_size_line_boundary() {
        // "4\r\n" | "Wiki\r\n5\r\n" | "pedia\r\n0\r\n\r\n"
        let (step, body) = decode_all(&[&WIKI[..3], &WIKI[3..12], &WIKI[12..]]);
        assert_eq!(step, ChunkStep::Finished);
        assert_eq!(&body[..], b"Wikipedia");
    }

    #[test]
    fn one_byte_at_a_time() {
        let parts: Vec<&[u8]> = WIKI.chunks(1).collect();
        let (step, body) = decode_all(&parts);
        assert_eq!(step, ChunkStep::Finished);
        assert_eq!(&body[..], b"Wikipedia");
    }

    #[test]
    fn prefix_seeds_the_buffer() {
        let mut state = ChunkedDecodeState::new(BytesMut::from(&WIKI[..10]));
        assert_eq!(state.decode(|_, _, _| {}), ChunkStep::NeedMore);
        state.feed(&WIKI[10..]);
        assert_eq!(state.decode(|_, _, _| {}), ChunkStep::Finished);
        assert_eq!(&state.into_body()[..], b"Wikipedia");
    }

    #[test]
    fn extensions_and_uppercase_hex() {
        let raw = b"A;name=value\r\n0123456789\r\n0\r\n\r\n";
        let (step, body) = decode_all(&[raw]);
        assert_eq!(step, ChunkStep::Finished);
        assert_eq!(&body[..], b"0123456789");
    }

    #[test]
    fn invalid_size_line_terminates_without_panic() {
        let mut state = ChunkedDecodeState::new(BytesMut::new());
        state.feed(b"4\r\nWiki\r\nzz-top\r\nmore data\r\n0\r\n\r\n");
        assert_eq!(state.decode(|_, _, _| {}), ChunkStep::Finished);
        assert!(state.is_desynced());
        assert_eq!(&state.into_body()[..], b"Wiki");
    }

    #[test]
    fn size_near_usize_max_terminates_without_panic() {
        // Size line of full width whose chunk would end one byte before usize::MAX.
        let digits = 2 * std::mem::size_of::<usize>();
        let size = usize::MAX - (digits + 2) - 1;
        let mut state = ChunkedDecodeState::new(BytesMut::from(format!("{:x}\r\nabc", size).as_bytes()));
        assert_eq!(state.decode(|_, _, _| {}), ChunkStep::Finished);
        assert!(state.is_desynced());
        assert!(state.into_body().is_empty());
    }

    #[test]
    fn trailers_are_consumed_and_dropped() {
        let raw = b"3\r\nabc\r\n0\r\nX-Trailer: yes\r\nX-Other: no\r\n\r\n";
        let mut state = ChunkedDecodeState::new(BytesMut::new());
        state.feed(raw);
        assert_eq!(state.decode(|_, _, _| {}), ChunkStep::Finished);
        assert!(!state.is_desynced());
        assert_eq!(state.position(), raw.len());
        assert_eq!(&state.into_body()[..], b"abc");
    }

    #[test]
    fn last_chunk_waits_for_empty_line() {
        let mut state = ChunkedDecodeState::new(BytesMut::new());
        state.feed(b"3\r\nabc\r\n0\r\n");
        assert_eq!(state.decode(|_, _, _| {}), ChunkStep::NeedMore);
        state.feed(b"X-Trailer: yes\r");
        assert_eq!(state.decode(|_, _, _| {}), ChunkStep::NeedMore);
        state.feed(b"\n\r\n");
        assert_eq!(state.decode(|_, _, _| {}), ChunkStep::Finished);
        assert!(!state.is_desynced());
    }

    #[test]
    fn bytes_after_body_mark_stream_desynced() {
        let raw = b"3\r\nabc\r\n0\r\n\r\nHTTP/1.1 200 OK\r\n";
        let mut state = ChunkedDecodeState::new(BytesMut::new());
        state.feed(raw);
        assert_eq!(state.decode(|_, _, _| {}), ChunkStep::Finished);
        assert!(state.is_desynced());
        assert_eq!(&state.into_body()[..], b"abc");
    }

    #[test]
    fn cursor_and_boundary_only_move_forward() {
        let mut state = ChunkedDecodeState::new(BytesMut::new());
        let mut last = (0, 0);
        for b in WIKI.chunks(2) {
            state.feed(b);
            state.decode(|_, _, _| {});
            let now = (state.position(), state.boundary());
            assert!(now.0 >= last.0 && now.1 >= last.1);
            last = now;
        }
        assert!(state.is_finished());
        assert_eq!(state.chunks(), 2);
        assert_eq!(state.position(), WIKI.len());
        assert!(!state.is_desynced());
    }

    #[test]
    fn chunk_callback_reports_progress() {
        let mut seen = Vec::new();
        let mut state = ChunkedDecodeState::new(BytesMut::new());
        state.feed(WIKI);
        state.decode(|n, len, total| seen.push((n, len, total)));
        assert_eq!(seen, vec![(1, 4, 4), (2, 5, 9)]);
    }

    #[test]
    fn incomplete_body_stays_partial() {
        let (step, body) = decode_all(&[b"4\r\nWiki\r\n5\r\npe"]);
        assert_eq!(step, ChunkStep::NeedMore);
        assert_eq!(&body[..], b"Wiki");
    }

    #[test]
    fn size_parsing() {
        assert_eq!(parse_chunk_size(b"1f"), Some(31));
        assert_eq!(parse_chunk_size(b" 10 "), Some(16));
        assert_eq!(parse_chunk_size(b"0;ext"), Some(0));
        assert_eq!(parse_chunk_size(b""), None);
        assert_eq!(parse_chunk_size(b"+5"), None);
        assert_eq!(parse_chunk_size(b"0x10"), None);
    }
}
