/*
 * parser.rs
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

//! HTTP/1.1 response head parser: status line and header fields of a complete header block.

use crate::protocol::http::error::TransferError;
use crate::protocol::http::response::Response;

/// Find CRLF in buf; return the index of the CR, or None if not found.
pub fn find_crlf(buf: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Parse a header block (everything before the blank line, without the terminator) into a
/// `Response` carrying status, reason, version and headers. The body is left empty.
pub fn parse_head(block: &[u8]) -> Result<Response, TransferError> {
    let text = std::str::from_utf8(block)
        .map_err(|_| TransferError::MalformedResponse("header is not valid UTF-8".to_string()))?;
    let mut lines = text.split("\r\n");
    let status_line = lines.next().unwrap_or("");

    // HTTP/1.1 200 OK or HTTP/1.1 200
    let parts: Vec<&str> = status_line.splitn(3, ' ').collect();
    let version = parts.first().copied().unwrap_or("");
    if !version.starts_with("HTTP/") {
        return Err(TransferError::MalformedResponse(format!(
            "invalid status line: {:?}",
            status_line
        )));
    }
    let code = parts
        .get(1)
        .and_then(|s| s.trim().parse::<u16>().ok())
        .filter(|c| (100..1000).contains(c))
        .ok_or_else(|| {
            TransferError::MalformedResponse(format!("invalid status code in {:?}", status_line))
        })?;
    let reason = parts.get(2).map(|s| s.trim()).filter(|s| !s.is_empty());

    let mut response = match reason {
        Some(r) => Response::with_reason(code, r),
        None => Response::new(code),
    };
    response.version = version.to_string();

    for line in lines {
        if line.is_empty() {
            continue;
        }
        // Obsolete line folding: continuation of the previous value.
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = response.headers.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
            continue;
        }
        if let Some(colon) = line.find(':') {
            let name = line[..colon].trim();
            let value = line[colon + 1..].trim();
            response.headers.push((name.to_string(), value.to_string()));
        }
    }
    Ok(response)
}
