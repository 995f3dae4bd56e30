//! Hostname resolution
//!
//! The dispatcher calls a [`Resolver`] only when the client sent a domain
//! name. Implementations must be safe to share across connections.

use crate::error::SocksError;
use crate::socks::context::{AuthContext, CTX_RESOLVED};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::net::IpAddr;
use std::time::Duration;

/// Maps a hostname to an IP address
#[async_trait]
pub trait Resolver: Send + Sync + Debug {
    /// Resolve `name`, returning the (possibly annotated) context and the IP
    ///
    /// Failures are reported as [`SocksError::Resolution`].
    async fn resolve(&self, ctx: AuthContext, name: &str)
        -> Result<(AuthContext, IpAddr), SocksError>;
}

/// Resolver backed by the system's name service
///
/// Lookups give up when the context is cancelled or after `timeout`.
#[derive(Debug, Clone)]
pub struct DnsResolver {
    timeout: Duration,
}

impl DnsResolver {
    /// Create a system resolver with the given lookup timeout
    pub fn new(timeout: Duration) -> Self {
        DnsResolver { timeout }
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        DnsResolver::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(
        &self,
        ctx: AuthContext,
        name: &str,
    ) -> Result<(AuthContext, IpAddr), SocksError> {
        let failure = |reason: String| SocksError::Resolution {
            host: name.to_string(),
            reason,
        };

        if name.is_empty() {
            return Err(failure("empty name".to_string()));
        }

        let lookup = tokio::time::timeout(self.timeout, tokio::net::lookup_host((name, 0)));

        let addrs = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(SocksError::Cancelled),
            result = lookup => match result {
                Ok(Ok(addrs)) => addrs,
                Ok(Err(e)) => return Err(failure(e.to_string())),
                Err(_) => return Err(failure(format!("lookup timed out after {:?}", self.timeout))),
            },
        };

        let mut addrs: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
        // Prefer IPv4 like most stub resolvers do for dual-stack names
        addrs.sort_by_key(|ip| ip.is_ipv6());

        let ip = addrs
            .into_iter()
            .next()
            .ok_or_else(|| failure("no addresses found".to_string()))?;

        tracing::debug!("Resolved {} to {}", name, ip);
        Ok((ctx.with_value(CTX_RESOLVED, name), ip))
    }
}

/// Resolver answering from a fixed table
///
/// Useful for tests and for deployments that pin names to addresses.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, IpAddr>,
}

impl StaticResolver {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, returning the resolver for chaining
    pub fn with_entry(mut self, name: impl Into<String>, ip: IpAddr) -> Self {
        self.entries.insert(name.into().to_ascii_lowercase(), ip);
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(
        &self,
        ctx: AuthContext,
        name: &str,
    ) -> Result<(AuthContext, IpAddr), SocksError> {
        match self.entries.get(&name.to_ascii_lowercase()) {
            Some(ip) => Ok((ctx.with_value(CTX_RESOLVED, name), *ip)),
            None => Err(SocksError::Resolution {
                host: name.to_string(),
                reason: "no static entry".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticResolver::new()
            .with_entry("Upstream.Test", IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)));

        let (ctx, ip) = resolver
            .resolve(AuthContext::default(), "upstream.test")
            .await
            .unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)));
        assert_eq!(ctx.value(CTX_RESOLVED), Some("upstream.test"));

        let err = resolver
            .resolve(AuthContext::default(), "missing.test")
            .await
            .unwrap_err();
        assert!(matches!(err, SocksError::Resolution { .. }));
    }

    #[tokio::test]
    async fn test_dns_resolver_localhost() {
        let resolver = DnsResolver::default();
        let (_, ip) = resolver
            .resolve(AuthContext::default(), "localhost")
            .await
            .unwrap();
        assert!(ip == IpAddr::V4(Ipv4Addr::LOCALHOST) || ip == IpAddr::V6(Ipv6Addr::LOCALHOST));
    }

    #[tokio::test]
    async fn test_dns_resolver_unresolvable() {
        let resolver = DnsResolver::new(Duration::from_secs(5));
        let result = resolver
            .resolve(AuthContext::default(), "this-domain-does-not-exist-12345.invalid")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_dns_resolver_empty_name() {
        let err = DnsResolver::default()
            .resolve(AuthContext::default(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, SocksError::Resolution { ref reason, .. } if reason == "empty name"));
    }

    #[tokio::test]
    async fn test_dns_resolver_cancelled() {
        let resolver = DnsResolver::default();
        let ctx = AuthContext::default();
        ctx.cancel();

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            resolver.resolve(ctx, "this-domain-does-not-exist-12345.invalid"),
        )
        .await
        .expect("cancelled lookup must return promptly");
        assert!(matches!(result, Err(SocksError::Cancelled)));
    }
}
