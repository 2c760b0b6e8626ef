// src/core/cluster/router.rs

//! Routes commands to the cluster node that owns their key's hash slot.
//!
//! Each node is reached through its own `SpinelClient`, created on first use
//! and reused afterwards. Redirect replies update the slot table (`MOVED`) or
//! trigger a one-off `ASKING` exchange (`ASK`), and the command is retried once.

use super::slot::get_slot_with;
use super::topology::SlotMap;
use crate::config::{ClientConfig, split_host_port};
use crate::core::client::SpinelClient;
use crate::core::command::Command;
use crate::core::connection::{Connector, TcpConnector};
use crate::core::dns::{DnsResolver, resolver_from_config};
use crate::core::protocol::{FromResp, RespFrame};
use crate::core::ClientError;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct ClusterInner {
    config: Arc<ClientConfig>,
    resolver: Arc<dyn DnsResolver>,
    connector: Arc<dyn Connector>,
    slots: RwLock<SlotMap>,
    nodes: DashMap<String, SpinelClient>,
}

/// A client for a sharded deployment. Cheap to clone.
#[derive(Clone)]
pub struct ClusterClient {
    inner: Arc<ClusterInner>,
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient")
            .field("seeds", &self.inner.config.cluster.seeds)
            .field("nodes", &self.inner.nodes.len())
            .finish()
    }
}

impl ClusterClient {
    /// Connects using the system resolver (or the configured DNS servers) and TCP.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let resolver = resolver_from_config(&config.dns)?;
        let connector = Arc::new(TcpConnector::new(config.connect_timeout));
        Self::connect_with(config, resolver, connector).await
    }

    /// Connects with explicit resolution and transport implementations.
    pub async fn connect_with(
        config: ClientConfig,
        resolver: Arc<dyn DnsResolver>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ClientError> {
        config
            .validate()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        if config.cluster.seeds.is_empty() {
            return Err(ClientError::Config("cluster mode requires at least one seed".into()));
        }
        let client = Self {
            inner: Arc::new(ClusterInner {
                config: Arc::new(config),
                resolver,
                connector,
                slots: RwLock::new(SlotMap::new()),
                nodes: DashMap::new(),
            }),
        };
        client.refresh_slots().await?;
        Ok(client)
    }

    /// Reloads the slot table from the first seed (or known node) that answers `CLUSTER SLOTS`.
    pub async fn refresh_slots(&self) -> Result<(), ClientError> {
        let mut candidates = self.inner.config.cluster.seeds.clone();
        let known_nodes = self.inner.slots.read().nodes();
        for known in known_nodes {
            if !candidates.contains(&known) {
                candidates.push(known);
            }
        }

        let mut last_error = None;
        for addr in candidates {
            let reply = match self.node(&addr).await {
                Ok(node) => {
                    node.send::<RespFrame>(Command::new("CLUSTER").arg("SLOTS"))
                        .await
                }
                Err(e) => Err(e),
            };
            match reply.and_then(|frame| SlotMap::from_cluster_slots(&frame)) {
                Ok(map) => {
                    info!(
                        "Loaded cluster topology from {}: {} slots across {} node(s)",
                        addr,
                        map.covered_slots(),
                        map.nodes().len()
                    );
                    *self.inner.slots.write() = map;
                    return Ok(());
                }
                Err(e) => {
                    warn!("Could not load cluster topology from {}: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }
        Err(ClientError::ClusterDown(format!(
            "no seed node returned the slot layout ({})",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// The node address that owns the command's routing key, or a seed for keyless commands.
    pub fn node_for(&self, command: &Command) -> String {
        let owner = command.routing_key().and_then(|key| {
            let slot = get_slot_with(self.inner.config.cluster.slot_hash, key);
            self.inner.slots.read().node_for_slot(slot).map(str::to_string)
        });
        match owner {
            Some(addr) => addr,
            None => self.inner.config.cluster.seeds[0].clone(),
        }
    }

    /// Returns the client for `addr`, connecting to it on first use.
    pub async fn node(&self, addr: &str) -> Result<SpinelClient, ClientError> {
        if let Some(client) = self.inner.nodes.get(addr) {
            return Ok(client.clone());
        }
        let (host, port) = split_host_port(addr)
            .ok_or_else(|| ClientError::Config(format!("invalid node address '{addr}'")))?;
        debug!("Opening connection to cluster node {}", addr);
        let client = SpinelClient::builder(self.inner.config.for_node(&host, port))
            .resolver(self.inner.resolver.clone())
            .connector(self.inner.connector.clone())
            .connect()
            .await?;
        Ok(self
            .inner
            .nodes
            .entry(addr.to_string())
            .or_insert(client)
            .clone())
    }

    /// Sends a command to the node owning its key, following one redirect.
    pub async fn execute<T: FromResp>(&self, command: Command) -> Result<T, ClientError> {
        let frame = self.execute_frame(command).await?;
        T::from_resp(frame)
    }

    async fn execute_frame(&self, command: Command) -> Result<RespFrame, ClientError> {
        let addr = self.node_for(&command);
        let node = self.node(&addr).await?;
        match node.send::<RespFrame>(command.clone()).await {
            Err(ClientError::Moved { slot, addr }) => {
                info!("Slot {} moved to {}", slot, addr);
                self.inner.slots.write().assign(slot, &addr);
                let node = self.node(&addr).await?;
                node.send(command).await
            }
            Err(ClientError::Ask { slot, addr }) => {
                debug!("Slot {} is migrating; asking {}", slot, addr);
                let node = self.node(&addr).await?;
                // Both are queued before either is awaited, so they go out back to back.
                let asking = node.send::<()>(Command::new("ASKING"));
                let reply = node.send::<RespFrame>(command);
                asking.await?;
                reply.await
            }
            other => other,
        }
    }

    /// Closes every node connection.
    pub async fn close(&self) {
        let nodes: Vec<SpinelClient> = self.inner.nodes.iter().map(|e| e.value().clone()).collect();
        self.inner.nodes.clear();
        for node in nodes {
            node.close().await;
        }
    }

    pub fn known_nodes(&self) -> Vec<String> {
        self.inner.nodes.iter().map(|e| e.key().clone()).collect()
    }
}
