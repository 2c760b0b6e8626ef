// src/core/dns/fixed.rs

use super::{AddressPreference, DnsResolver, unknown_host};
use crate::core::ClientError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;

/// A resolver backed by a fixed host table. Useful for tests and for
/// pinning hosts without touching the system configuration.
#[derive(Debug, Default)]
pub struct StaticResolver {
    hosts: RwLock<HashMap<String, Vec<IpAddr>>>,
    preference: AddressPreference,
}

impl StaticResolver {
    pub fn new(preference: AddressPreference) -> Self {
        Self {
            hosts: RwLock::new(HashMap::new()),
            preference,
        }
    }

    pub fn with_host(self, host: &str, addrs: Vec<IpAddr>) -> Self {
        self.set_host(host, addrs);
        self
    }

    /// Replaces the addresses of `host`. Takes effect on the next resolution.
    pub fn set_host(&self, host: &str, addrs: Vec<IpAddr>) {
        self.hosts.write().insert(host.to_ascii_lowercase(), addrs);
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ClientError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        let addrs = self
            .hosts
            .read()
            .get(&host.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default();
        if addrs.is_empty() {
            return Err(unknown_host(host, "host is not in the static table"));
        }
        Ok(self.preference.order(addrs))
    }
}
