//! Endpoint address resolution.
//!
//! Expands an endpoint URL into the ordered list of candidate URLs the
//! connection racer attempts.
//!
//! # Candidate Order
//!
//! 1. The literal URL, always first
//! 2. One URL per resolved IPv4 address, host replaced by the address
//! 3. One URL per resolved IPv6 address
//!
//! Substitution only happens when the host is a domain name resolving to
//! two or more distinct addresses; otherwise the result is the literal URL.

// ============================================================================
// Imports
// ============================================================================

use std::io::{Error as IoError, ErrorKind};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::net::lookup_host;
use tracing::{debug, warn};
use url::{Host, Url};

// ============================================================================
// Resolver
// ============================================================================

/// Result of resolving both address families of one host.
pub type FamilyLookup = (
    std::io::Result<Vec<Ipv4Addr>>,
    std::io::Result<Vec<Ipv6Addr>>,
);

/// Per-family host name lookup.
///
/// The families are queried independently so one failing family does not
/// sink the other.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolves `host` to its IPv4 addresses.
    async fn lookup_ipv4(&self, host: &str) -> std::io::Result<Vec<Ipv4Addr>>;

    /// Resolves `host` to its IPv6 addresses.
    async fn lookup_ipv6(&self, host: &str) -> std::io::Result<Vec<Ipv6Addr>>;

    /// Resolves both families. Runs the two lookups concurrently unless
    /// the implementation can answer both from one query.
    async fn lookup(&self, host: &str) -> FamilyLookup {
        tokio::join!(self.lookup_ipv4(host), self.lookup_ipv6(host))
    }
}

// ============================================================================
// SystemResolver
// ============================================================================

/// Resolver backed by the operating system (`getaddrinfo`).
///
/// One query returns both families, so [`Resolver::lookup`] issues it once.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl SystemResolver {
    async fn query(host: &str) -> std::io::Result<Vec<IpAddr>> {
        Ok(lookup_host((host, 0)).await?.map(|addr| addr.ip()).collect())
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup_ipv4(&self, host: &str) -> std::io::Result<Vec<Ipv4Addr>> {
        self.lookup(host).await.0
    }

    async fn lookup_ipv6(&self, host: &str) -> std::io::Result<Vec<Ipv6Addr>> {
        self.lookup(host).await.1
    }

    async fn lookup(&self, host: &str) -> FamilyLookup {
        match Self::query(host).await {
            Ok(addrs) => split_families(addrs),
            Err(e) => (
                Err(IoError::new(e.kind(), e.to_string())),
                Err(e),
            ),
        }
    }
}

/// Splits mixed addresses by family; an empty family is `NotFound`.
fn split_families(addrs: Vec<IpAddr>) -> FamilyLookup {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for ip in addrs {
        match ip {
            IpAddr::V4(addr) => v4.push(addr),
            IpAddr::V6(addr) => v6.push(addr),
        }
    }

    (non_empty(v4, "no IPv4 addresses"), non_empty(v6, "no IPv6 addresses"))
}

fn non_empty<T>(addrs: Vec<T>, message: &str) -> std::io::Result<Vec<T>> {
    if addrs.is_empty() {
        return Err(IoError::new(ErrorKind::NotFound, message.to_string()));
    }
    Ok(addrs)
}

// ============================================================================
// StaticResolver
// ============================================================================

/// Resolver answering from a fixed host table.
///
/// Useful for pinning hosts or for tests. A host with no addresses of a
/// family yields a `NotFound` error for that family.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: FxHashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    /// Creates an empty resolver.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds addresses for a host, in the order they should be returned.
    #[must_use]
    pub fn with_host(
        mut self,
        host: impl Into<String>,
        addrs: impl IntoIterator<Item = IpAddr>,
    ) -> Self {
        self.hosts.entry(host.into()).or_default().extend(addrs);
        self
    }

    fn family<T>(&self, host: &str, pick: impl Fn(&IpAddr) -> Option<T>) -> std::io::Result<Vec<T>> {
        let addrs: Vec<T> = self
            .hosts
            .get(host)
            .map(|addrs| addrs.iter().filter_map(&pick).collect())
            .unwrap_or_default();

        if addrs.is_empty() {
            return Err(IoError::new(
                ErrorKind::NotFound,
                format!("no addresses for {host}"),
            ));
        }
        Ok(addrs)
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn lookup_ipv4(&self, host: &str) -> std::io::Result<Vec<Ipv4Addr>> {
        self.family(host, |ip| match ip {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }

    async fn lookup_ipv6(&self, host: &str) -> std::io::Result<Vec<Ipv6Addr>> {
        self.family(host, |ip| match ip {
            IpAddr::V6(v6) => Some(*v6),
            IpAddr::V4(_) => None,
        })
    }
}

// ============================================================================
// Candidate Expansion
// ============================================================================

/// Expands an endpoint URL into ordered connection candidates.
///
/// Never fails: resolution errors fall back to `[url]`.
pub async fn resolve_candidates(url: &Url, resolver: &dyn Resolver) -> Vec<Url> {
    let domain = match url.host() {
        Some(Host::Domain(domain)) => domain,
        Some(Host::Ipv4(_) | Host::Ipv6(_)) | None => return vec![url.clone()],
    };

    let (v4, v6) = resolver.lookup(domain).await;

    let mut addrs: Vec<IpAddr> = Vec::new();
    match v4 {
        Ok(found) => addrs.extend(found.into_iter().map(IpAddr::V4)),
        Err(e) => warn!(host = domain, error = %e, "IPv4 resolution failed"),
    }
    match v6 {
        Ok(found) => addrs.extend(found.into_iter().map(IpAddr::V6)),
        Err(e) => warn!(host = domain, error = %e, "IPv6 resolution failed"),
    }

    let mut seen = FxHashSet::default();
    addrs.retain(|ip| seen.insert(*ip));

    if addrs.len() < 2 {
        debug!(host = domain, count = addrs.len(), "No address substitution");
        return vec![url.clone()];
    }

    let mut candidates = Vec::with_capacity(addrs.len() + 1);
    candidates.push(url.clone());
    for ip in addrs {
        let mut candidate = url.clone();
        if candidate.set_ip_host(ip).is_ok() {
            candidates.push(candidate);
        }
    }

    debug!(host = domain, count = candidates.len(), "Resolved connection candidates");
    candidates
}

// ============================================================================
// Tests
// ============================================================================
