// src/config.rs

//! Manages client configuration: loading from TOML, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::warn;

/// What happens to commands submitted while the connection is down.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DisconnectedBehavior {
    /// Keep the command and send it once the connection is re-established.
    #[default]
    Buffer,
    /// Fail the command immediately with `NotConnected`.
    Reject,
}

/// The CRC16 variant used to map keys to cluster hash slots.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SlotHash {
    /// CRC-16/USB, as SpinelDB cluster nodes compute it.
    #[default]
    Usb,
    /// CRC-16/XMODEM, for Redis Cluster compatible servers.
    Xmodem,
}

/// The delay shape between reconnection attempts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackoffConfig {
    Fixed {
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },
    Exponential {
        #[serde(with = "humantime_serde")]
        initial: Duration,
        #[serde(with = "humantime_serde")]
        max: Duration,
    },
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(30),
        }
    }
}

/// Settings for the reconnection manager.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// If false, a lost connection fails every outstanding command and stays down.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Resend commands that were in flight when the connection dropped.
    #[serde(default = "default_true")]
    pub retry_on_reconnect: bool,
    /// Fail buffered commands after every failed attempt instead of holding them.
    #[serde(default)]
    pub cancel_on_reconnect_failure: bool,
    /// Upper bound on consecutive attempts. `None` retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Random extra delay added to every backoff step.
    #[serde(with = "humantime_serde", default = "default_jitter")]
    pub jitter: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_on_reconnect: true,
            cancel_on_reconnect_failure: false,
            max_attempts: None,
            backoff: BackoffConfig::default(),
            jitter: default_jitter(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_jitter() -> Duration {
    Duration::from_millis(100)
}

/// Outbound buffer limits.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BufferConfig {
    /// Above this many unwritten bytes new commands are rejected with `Backpressure`.
    #[serde(default = "default_high_watermark")]
    pub high_watermark: usize,
    /// Commands are accepted again once unwritten bytes drop to this level.
    #[serde(default = "default_low_watermark")]
    pub low_watermark: usize,
    #[serde(default)]
    pub disconnected_behavior: DisconnectedBehavior,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            high_watermark: default_high_watermark(),
            low_watermark: default_low_watermark(),
            disconnected_behavior: DisconnectedBehavior::default(),
        }
    }
}

fn default_high_watermark() -> usize {
    16 * 1024 * 1024 // 16 MB
}
fn default_low_watermark() -> usize {
    4 * 1024 * 1024 // 4 MB
}

/// Host name resolution settings.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsConfig {
    #[serde(default)]
    pub prefer_ipv4: bool,
    #[serde(default)]
    pub prefer_ipv6: bool,
    /// Alternate DNS servers (`ip`, `ip:port` or `[ipv6]:port`). Empty uses the system resolver.
    #[serde(default)]
    pub servers: Vec<String>,
}

/// Settings for cluster mode.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterClientConfig {
    /// If `true`, commands are routed by hash slot across the cluster.
    #[serde(default)]
    pub enabled: bool,
    /// Seed nodes (`host:port`) used to discover the slot layout.
    #[serde(default)]
    pub seeds: Vec<String>,
    /// Must match the hash the cluster nodes use, or every keyed command pays a `MOVED` round-trip.
    #[serde(default)]
    pub slot_hash: SlotHash,
}

/// The complete client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Sent as `AUTH <password>` on every new connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Sent as `CLIENT SETNAME <name>` on every new connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Sent as `SELECT <database>` on every new connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<u32>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Applied to every command handle. `None` waits indefinitely.
    #[serde(with = "humantime_serde", default)]
    pub command_timeout: Option<Duration>,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub cluster: ClusterClientConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7878
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(2)
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
            client_name: None,
            database: None,
            log_level: default_log_level(),
            connect_timeout: default_connect_timeout(),
            command_timeout: None,
            reconnect: ReconnectConfig::default(),
            buffer: BufferConfig::default(),
            dns: DnsConfig::default(),
            cluster: ClusterClientConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Creates a new `ClientConfig` by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config in '{path}'"))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ClientConfig =
            toml::from_str(contents).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// A copy of this configuration pointed at another node, used by the cluster router.
    pub fn for_node(&self, host: &str, port: u16) -> Self {
        let mut config = self.clone();
        config.host = host.to_string();
        config.port = port;
        config.cluster = ClusterClientConfig::default();
        config
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.connect_timeout.is_zero() {
            return Err(anyhow!("connect_timeout cannot be 0"));
        }
        if self.buffer.low_watermark >= self.buffer.high_watermark {
            return Err(anyhow!(
                "buffer.low_watermark ({}) must be lower than buffer.high_watermark ({})",
                self.buffer.low_watermark,
                self.buffer.high_watermark
            ));
        }

        match self.reconnect.backoff {
            BackoffConfig::Fixed { delay } if delay.is_zero() => {
                warn!("reconnect.backoff delay is 0; reconnect attempts will not be spaced out");
            }
            BackoffConfig::Exponential { initial, max } => {
                if initial.is_zero() {
                    return Err(anyhow!("reconnect.backoff.initial cannot be 0"));
                }
                if initial > max {
                    return Err(anyhow!(
                        "reconnect.backoff.initial cannot be greater than reconnect.backoff.max"
                    ));
                }
            }
            _ => {}
        }
        if self.reconnect.max_attempts == Some(0) {
            return Err(anyhow!(
                "reconnect.max_attempts cannot be 0; set reconnect.enabled = false instead"
            ));
        }

        if self.dns.prefer_ipv4 && self.dns.prefer_ipv6 {
            warn!("Both dns.prefer_ipv4 and dns.prefer_ipv6 are set; using the resolver's order.");
        }
        for server in &self.dns.servers {
            crate::core::dns::parse_dns_server(server)
                .map_err(|e| anyhow!("invalid dns server '{server}': {e}"))?;
        }

        if self.cluster.enabled {
            if self.cluster.seeds.is_empty() {
                return Err(anyhow!("cluster.enabled requires at least one seed"));
            }
            for seed in &self.cluster.seeds {
                split_host_port(seed)
                    .ok_or_else(|| anyhow!("invalid cluster seed '{seed}', expected host:port"))?;
            }
        }

        Ok(())
    }
}

/// Splits `host:port` (or `[ipv6]:port`) into its parts.
pub fn split_host_port(addr: &str) -> Option<(String, u16)> {
    if let Ok(sock) = addr.parse::<SocketAddr>() {
        return Some((sock.ip().to_string(), sock.port()));
    }
    let (host, port) = addr.rsplit_once(':')?;
    let port = port.parse::<u16>().ok().filter(|p| *p != 0)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}
