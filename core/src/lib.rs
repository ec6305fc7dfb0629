/*
 * lib.rs
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

//! Postiglione core: HTTP/1.1 client wire-transfer engine.
//!
//! - `protocol::http`: address resolution, TCP/TLS connect, request transmission, response
//!   framing and body decoding under one deadline, with errors mapped to HTTP-shaped responses.
//! - `net`: rustls client configuration and certificate callbacks.
//! - `config`: client configuration and its XML file form.

pub mod config;
pub mod net;
pub mod protocol;
