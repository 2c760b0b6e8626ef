// src/core/dns/mod.rs

//! Host name resolution for connection attempts.
//!
//! A resolver turns the configured host into an ordered, non-empty list of
//! addresses. Ordering by address family is applied on top of whatever the
//! underlying resolver returns, so every implementation shares it.

use crate::config::DnsConfig;
use crate::core::ClientError;
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

mod fixed;
mod system;
mod upstream;

pub use fixed::StaticResolver;
pub use system::SystemResolver;
pub use upstream::UpstreamResolver;

/// The port used for DNS servers configured without one.
pub const DEFAULT_DNS_PORT: u16 = 53;

#[async_trait]
pub trait DnsResolver: Send + Sync + 'static {
    /// Returns at least one address for `host`, or `UnknownHost`.
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ClientError>;
}

/// Which address family goes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressPreference {
    Ipv4First,
    Ipv6First,
    /// Keep the order the resolver produced.
    #[default]
    SystemDefault,
}

impl AddressPreference {
    pub fn from_flags(prefer_ipv4: bool, prefer_ipv6: bool) -> Self {
        match (prefer_ipv4, prefer_ipv6) {
            (true, false) => AddressPreference::Ipv4First,
            (false, true) => AddressPreference::Ipv6First,
            _ => AddressPreference::SystemDefault,
        }
    }

    /// Reorders `addrs` by family, stable within each family, and removes duplicates.
    pub fn order(self, addrs: Vec<IpAddr>) -> Vec<IpAddr> {
        let mut unique: Vec<IpAddr> = Vec::with_capacity(addrs.len());
        for addr in addrs {
            if !unique.contains(&addr) {
                unique.push(addr);
            }
        }
        let first_v4 = match self {
            AddressPreference::Ipv4First => true,
            AddressPreference::Ipv6First => false,
            AddressPreference::SystemDefault => return unique,
        };
        let (mut ordered, rest): (Vec<_>, Vec<_>) =
            unique.into_iter().partition(|a| a.is_ipv4() == first_v4);
        ordered.extend(rest);
        ordered
    }
}

/// Parses a DNS server entry: `ip`, `ip:port` or `[ipv6]:port`.
pub fn parse_dns_server(entry: &str) -> Result<SocketAddr, ClientError> {
    let entry = entry.trim();
    if let Ok(addr) = entry.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let bare = entry.trim_start_matches('[').trim_end_matches(']');
    bare.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DEFAULT_DNS_PORT))
        .map_err(|_| ClientError::Config(format!("'{entry}' is not an IP address or socket address")))
}

/// Builds the resolver described by `config`: the system resolver, or the
/// configured DNS servers when there are any.
pub fn resolver_from_config(config: &DnsConfig) -> Result<Arc<dyn DnsResolver>, ClientError> {
    let preference = AddressPreference::from_flags(config.prefer_ipv4, config.prefer_ipv6);
    if config.servers.is_empty() {
        return Ok(Arc::new(SystemResolver::new(preference)));
    }
    let servers = config
        .servers
        .iter()
        .map(|s| parse_dns_server(s))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Arc::new(UpstreamResolver::new(servers, preference)?))
}

pub(crate) fn unknown_host(host: &str, reason: impl Into<String>) -> ClientError {
    ClientError::UnknownHost {
        host: host.to_string(),
        reason: reason.into(),
    }
}
