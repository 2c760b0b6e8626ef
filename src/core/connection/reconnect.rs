// src/core/connection/reconnect.rs

//! Establishing a connection: resolve the host, connect to each address in
//! order, and run the handshake. Used for the first connection and for every
//! reconnection attempt.

use super::transport::{BoxedTransport, Connector};
use crate::config::{BackoffConfig, ClientConfig, ReconnectConfig};
use crate::core::ClientError;
use crate::core::command::Command;
use crate::core::dns::DnsResolver;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use futures::{SinkExt, StreamExt};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Computes the delay before each reconnection attempt.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffConfig,
    jitter: Duration,
    max_attempts: Option<u32>,
    failures: u32,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            policy: config.backoff,
            jitter: config.jitter,
            max_attempts: config.max_attempts,
            failures: 0,
        }
    }

    /// Number of failed attempts recorded so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Records a failed attempt and returns how long to wait before the next one,
    /// or `None` when the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if let Some(max) = self.max_attempts
            && self.failures >= max
        {
            return None;
        }
        let base = match self.policy {
            BackoffConfig::Fixed { delay } => delay,
            BackoffConfig::Exponential { initial, max } => {
                let shift = (self.failures - 1).min(20);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        };
        Some(base + self.jitter())
    }

    fn jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let millis = self.jitter.as_millis().min(u64::MAX as u128) as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }
}

/// Produces fresh, ready-to-use transports for a dispatcher.
pub struct ReconnectionManager {
    config: Arc<ClientConfig>,
    resolver: Arc<dyn DnsResolver>,
    connector: Arc<dyn Connector>,
}

impl ReconnectionManager {
    pub fn new(
        config: Arc<ClientConfig>,
        resolver: Arc<dyn DnsResolver>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            config,
            resolver,
            connector,
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(&self.config.reconnect)
    }

    /// Resolves the configured host and connects to the first address that accepts.
    /// The handshake runs before the transport is returned.
    pub async fn establish(&self) -> Result<BoxedTransport, ClientError> {
        let host = &self.config.host;
        let addrs = self.resolver.resolve(host).await?;
        debug!("Resolved '{}' to {:?}", host, addrs);

        let mut last_error = None;
        for ip in addrs {
            let addr = SocketAddr::new(ip, self.config.port);
            match timeout(self.config.connect_timeout, self.connector.connect(addr)).await {
                Ok(Ok(transport)) => {
                    let transport = self.handshake(transport).await?;
                    info!("Connected to {} ({})", host, addr);
                    return Ok(transport);
                }
                Ok(Err(e)) => {
                    debug!("Connection to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
                Err(_) => {
                    debug!("Connection to {} timed out", addr);
                    last_error = Some(ClientError::Connection(format!(
                        "connect to {addr} timed out"
                    )));
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| ClientError::Connection(format!("no address to connect to for '{host}'"))))
    }

    /// Commands sent on every new connection before anything else.
    pub fn handshake_commands(&self) -> Vec<Command> {
        let mut commands = Vec::new();
        if let Some(password) = &self.config.password {
            commands.push(Command::new("AUTH").arg(password));
        }
        if let Some(name) = &self.config.client_name {
            commands.push(Command::new("CLIENT").arg("SETNAME").arg(name));
        }
        if let Some(db) = self.config.database {
            commands.push(Command::new("SELECT").arg_int(db as i64));
        }
        commands
    }

    async fn handshake(&self, transport: BoxedTransport) -> Result<BoxedTransport, ClientError> {
        let commands = self.handshake_commands();
        if commands.is_empty() {
            return Ok(transport);
        }

        let mut framed = Framed::new(transport, RespFrameCodec);
        let exchange = async {
            for command in &commands {
                framed.feed(command.to_frame()).await?;
            }
            framed.flush().await?;
            for command in &commands {
                match framed.next().await {
                    Some(Ok(RespFrame::Error(message))) => {
                        warn!("Handshake command {} rejected: {}", command.name_lossy(), message);
                        return Err(ClientError::Server(message));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(ClientError::Connection(
                            "connection closed during handshake".into(),
                        ));
                    }
                }
            }
            Ok(())
        };
        timeout(self.config.connect_timeout, exchange).await??;

        let parts = framed.into_parts();
        if !parts.read_buf.is_empty() {
            warn!(
                "Discarding {} unexpected bytes received during handshake",
                parts.read_buf.len()
            );
        }
        Ok(parts.io)
    }
}
