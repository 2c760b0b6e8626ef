// src/core/dns/system.rs

use super::{AddressPreference, DnsResolver, unknown_host};
use crate::core::ClientError;
use async_trait::async_trait;
use std::net::IpAddr;
use tracing::debug;

/// Resolves through the operating system (`getaddrinfo`).
#[derive(Debug, Clone, Default)]
pub struct SystemResolver {
    preference: AddressPreference,
}

impl SystemResolver {
    pub fn new(preference: AddressPreference) -> Self {
        Self { preference }
    }
}

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ClientError> {
        if let Ok(ip) = host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        // The port is irrelevant; lookup_host requires one.
        let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| unknown_host(host, e.to_string()))?
            .map(|sa| sa.ip())
            .collect();
        debug!("System resolver returned {} address(es) for '{}'", addrs.len(), host);
        if addrs.is_empty() {
            return Err(unknown_host(host, "no addresses found"));
        }
        Ok(self.preference.order(addrs))
    }
}
