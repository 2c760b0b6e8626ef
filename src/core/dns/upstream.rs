// src/core/dns/upstream.rs

use super::{AddressPreference, DnsResolver, unknown_host};
use crate::core::ClientError;
use async_trait::async_trait;
use hickory_resolver::Resolver;
use hickory_resolver::config::{LookupIpStrategy, NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

/// Resolves by querying explicitly configured DNS servers over UDP.
pub struct UpstreamResolver {
    resolver: Resolver<TokioConnectionProvider>,
    preference: AddressPreference,
}

impl std::fmt::Debug for UpstreamResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResolver")
            .field("name_servers", &self.resolver.config().name_servers().len())
            .field("preference", &self.preference)
            .finish()
    }
}

impl UpstreamResolver {
    pub fn new(servers: Vec<SocketAddr>, preference: AddressPreference) -> Result<Self, ClientError> {
        if servers.is_empty() {
            return Err(ClientError::Config("no DNS servers configured".into()));
        }
        let name_servers: Vec<NameServerConfig> = servers
            .into_iter()
            .map(|addr| NameServerConfig::new(addr, Protocol::Udp))
            .collect();
        let config = ResolverConfig::from_parts(None, vec![], name_servers);
        // Both families are queried; `preference` decides the order afterwards.
        let mut opts = ResolverOpts::default();
        opts.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
        let resolver = Resolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build();
        Ok(Self {
            resolver,
            preference,
        })
    }

    pub fn preference(&self) -> AddressPreference {
        self.preference
    }

    /// The record types queried for each lookup.
    pub fn lookup_strategy(&self) -> LookupIpStrategy {
        self.resolver.options().ip_strategy
    }
}

#[async_trait]
impl DnsResolver for UpstreamResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ClientError> {
        if let Ok(ip) = host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        let lookup = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| unknown_host(host, e.to_string()))?;
        let addrs: Vec<IpAddr> = lookup.iter().collect();
        debug!("DNS servers returned {} address(es) for '{}'", addrs.len(), host);
        if addrs.is_empty() {
            return Err(unknown_host(host, "no addresses found"));
        }
        Ok(self.preference.order(addrs))
    }
}
