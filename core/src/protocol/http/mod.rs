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

//! HTTP/1.1 client wire-transfer engine.
//!
//! - `resolver`: host → one IP address (literals and loopback names without DNS), cached per client.
//! - `connection`: TCP stream, optionally TLS-wrapped; request serialization.
//! - `h1`: response header framing, head parsing, body decoding (fixed, chunked, until close).
//! - `client`: `HttpClient`, which bounds every phase by one deadline, maps failures to
//!   synthesized 408/400 responses and decides whether the connection is kept.
//! - Buffers: `bytes` crate (BytesMut for accumulators, Bytes for bodies).

mod deadline;
mod error;
mod handler;
mod request;
mod response;

pub mod client;
pub mod connection;
pub mod h1;
pub mod resolver;

pub use client::{HttpClient, TransferAttempt};
pub use connection::{Connection, HttpStream};
pub use deadline::{CancelToken, Deadline, Interrupt, TransferPhase};
pub use error::TransferError;
pub use handler::{Observers, TransferObserver};
pub use request::{Method, Request, RequestBuilder};
pub use resolver::{AddressResolver, DnsClient, StaticDnsClient, SystemDnsClient};
pub use response::Response;
