/*
 * mod.rs
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

//! HTTP/1.1 response side: head parsing, header framing, body decoding.

pub mod body;
pub mod chunked;
pub mod framer;
pub mod parser;

#[cfg(test)]
pub(crate) mod testing;

pub use body::{read_body, select_framing, Body, Framing};
pub use chunked::{ChunkStep, ChunkedDecodeState};
pub use framer::{read_head, FramedHead};
pub use parser::parse_head;
