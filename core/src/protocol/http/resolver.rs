/*
 * resolver.rs
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

//! Address resolution: loopback names and IP literals are handled locally, everything else goes
//! to a pluggable DNS client (A and AAAA queried concurrently). The result is cached per client.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::protocol::http::error::TransferError;

/// Boxed future returned by DNS queries.
pub type DnsFuture<'a, T> = Pin<Box<dyn Future<Output = io::Result<Vec<T>>> + Send + 'a>>;

/// DNS collaborator: A and AAAA lookups. Either may return an empty list.
pub trait DnsClient: Send + Sync {
    fn query_a<'a>(&'a self, name: &'a str) -> DnsFuture<'a, Ipv4Addr>;

    fn query_aaaa<'a>(&'a self, name: &'a str) -> DnsFuture<'a, Ipv6Addr>;
}

/// DNS client backed by the system resolver (`tokio::net::lookup_host`), filtered by family.
#[derive(Debug, Clone, Default)]
pub struct SystemDnsClient;

impl SystemDnsClient {
    async fn lookup(name: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((name, 0)).await?;
        Ok(addrs.map(|a| a.ip()).collect())
    }
}

impl DnsClient for SystemDnsClient {
    fn query_a<'a>(&'a self, name: &'a str) -> DnsFuture<'a, Ipv4Addr> {
        Box::pin(async move {
            let ips = Self::lookup(name).await?;
            Ok(ips
                .into_iter()
                .filter_map(|ip| match ip {
                    IpAddr::V4(v4) => Some(v4),
                    IpAddr::V6(_) => None,
                })
                .collect())
        })
    }

    fn query_aaaa<'a>(&'a self, name: &'a str) -> DnsFuture<'a, Ipv6Addr> {
        Box::pin(async move {
            let ips = Self::lookup(name).await?;
            Ok(ips
                .into_iter()
                .filter_map(|ip| match ip {
                    IpAddr::V6(v6) => Some(v6),
                    IpAddr::V4(_) => None,
                })
                .collect())
        })
    }
}

/// Fixed name → address table. Counts queries so callers can tell whether DNS was consulted.
#[derive(Debug, Default)]
pub struct StaticDnsClient {
    a: HashMap<String, Vec<Ipv4Addr>>,
    aaaa: HashMap<String, Vec<Ipv6Addr>>,
    queries: AtomicUsize,
}

impl StaticDnsClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_a(mut self, name: impl Into<String>, addr: Ipv4Addr) -> Self {
        self.a.entry(name.into().to_ascii_lowercase()).or_default().push(addr);
        self
    }

    pub fn with_aaaa(mut self, name: impl Into<String>, addr: Ipv6Addr) -> Self {
        self.aaaa.entry(name.into().to_ascii_lowercase()).or_default().push(addr);
        self
    }

    /// Number of A plus AAAA queries answered so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl DnsClient for StaticDnsClient {
    fn query_a<'a>(&'a self, name: &'a str) -> DnsFuture<'a, Ipv4Addr> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let found = self.a.get(&name.to_ascii_lowercase()).cloned().unwrap_or_default();
        Box::pin(async move { Ok(found) })
    }

    fn query_aaaa<'a>(&'a self, name: &'a str) -> DnsFuture<'a, Ipv6Addr> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let found = self.aaaa.get(&name.to_ascii_lowercase()).cloned().unwrap_or_default();
        Box::pin(async move { Ok(found) })
    }
}

/// Parse a loopback token or an IP literal without touching DNS.
pub fn parse_literal(host: &str) -> Option<IpAddr> {
    let host = host.trim();
    match host.to_ascii_lowercase().as_str() {
        "localhost" | "localhost4" => return Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        "localhost6" | "ip6-localhost" => return Some(IpAddr::V6(Ipv6Addr::LOCALHOST)),
        _ => {}
    }
    if let Ok(v4) = host.parse::<Ipv4Addr>() {
        return Some(IpAddr::V4(v4));
    }
    let unbracketed = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    unbracketed.parse::<Ipv6Addr>().ok().map(IpAddr::V6)
}

/// Resolves the client's remote host to one address and remembers it until cleared.
pub struct AddressResolver {
    dns: Arc<dyn DnsClient>,
    cached: Option<(String, IpAddr)>,
}

impl AddressResolver {
    pub fn new(dns: Arc<dyn DnsClient>) -> Self {
        Self { dns, cached: None }
    }

    pub fn cached(&self) -> Option<IpAddr> {
        self.cached.as_ref().map(|(_, ip)| *ip)
    }

    /// Forget the cached address so the next call resolves again.
    pub fn clear(&mut self) {
        self.cached = None;
    }

    pub async fn resolve(&mut self, host: &str) -> Result<IpAddr, TransferError> {
        if let Some((name, ip)) = &self.cached {
            if name == host {
                return Ok(*ip);
            }
        }
        let ip = match parse_literal(host) {
            Some(ip) => ip,
            None => self.query(host).await?,
        };
        tracing::debug!(host, %ip, "resolved remote address");
        self.cached = Some((host.to_string(), ip));
        Ok(ip)
    }

    async fn query(&self, host: &str) -> Result<IpAddr, TransferError> {
        let (a, aaaa) = tokio::join!(self.dns.query_a(host), self.dns.query_aaaa(host));
        let a = a.unwrap_or_else(|e| {
            tracing::debug!(host, error = %e, "A query failed");
            Vec::new()
        });
        let aaaa = aaaa.unwrap_or_else(|e| {
            tracing::debug!(host, error = %e, "AAAA query failed");
            Vec::new()
        });
        let ip = a
            .first()
            .copied()
            .map(IpAddr::V4)
            .or_else(|| aaaa.first().copied().map(IpAddr::V6))
            .ok_or_else(|| TransferError::AddressResolution {
                host: host.to_string(),
                reason: "no A or AAAA record".to_string(),
            })?;
        if ip.is_unspecified() {
            return Err(TransferError::AddressResolution {
                host: host.to_string(),
                reason: format!("DNS returned unspecified address {}", ip),
            });
        }
        Ok(ip)
    }
}
