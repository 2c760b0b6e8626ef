// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests
//!
//! The client never touches a real socket here: `MockConnector` hands it one
//! end of an in-memory duplex pipe and gives the other end to the test as a
//! `ServerConn`, which plays the server side of the protocol by hand.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use spineldb_client::config::{BackoffConfig, ClientConfig};
use spineldb_client::core::connection::{BoxedTransport, ConnectionState, Connector};
use spineldb_client::core::dns::{AddressPreference, StaticResolver};
use spineldb_client::core::protocol::{RespFrame, RespFrameCodec};
use spineldb_client::{ClientError, SpinelClient};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Host name every test config points at.
pub const TEST_HOST: &str = "spinel.test";
pub const TEST_PORT: u16 = 7878;

/// How long a test waits for the client to do something before failing.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    // Initialize tracing (ignore error if already initialized)
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// A config with fast, deterministic reconnects.
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig {
        host: TEST_HOST.to_string(),
        port: TEST_PORT,
        connect_timeout: Duration::from_secs(1),
        ..ClientConfig::default()
    };
    config.reconnect.backoff = BackoffConfig::Fixed {
        delay: Duration::from_millis(10),
    };
    config.reconnect.jitter = Duration::ZERO;
    config
}

pub fn test_resolver() -> Arc<StaticResolver> {
    Arc::new(
        StaticResolver::new(AddressPreference::SystemDefault)
            .with_host(TEST_HOST, vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]),
    )
}

/// Hands out in-memory transports and reports them to the paired `MockServer`.
pub struct MockConnector {
    conns: mpsc::UnboundedSender<ServerConn>,
    refusing: AtomicBool,
    attempts: AtomicUsize,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, addr: SocketAddr) -> Result<BoxedTransport, ClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refusing.load(Ordering::SeqCst) {
            return Err(ClientError::Connection(format!("{addr}: connection refused")));
        }
        let (client, server) = tokio::io::duplex(64 * 1024);
        self.conns
            .send(ServerConn::new(server, addr))
            .map_err(|_| ClientError::Connection("mock server is gone".into()))?;
        Ok(Box::new(client))
    }
}

/// The test's side of the fake network.
pub struct MockServer {
    connector: Arc<MockConnector>,
    conns: mpsc::UnboundedReceiver<ServerConn>,
}

impl MockServer {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            connector: Arc::new(MockConnector {
                conns: tx,
                refusing: AtomicBool::new(false),
                attempts: AtomicUsize::new(0),
            }),
            conns: rx,
        }
    }

    pub fn connector(&self) -> Arc<MockConnector> {
        self.connector.clone()
    }

    /// While set, every connection attempt fails.
    pub fn set_refusing(&self, refusing: bool) {
        self.connector.refusing.store(refusing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.connector.attempts.load(Ordering::SeqCst)
    }

    /// Waits for the client to open the next connection.
    pub async fn accept(&mut self) -> ServerConn {
        tokio::time::timeout(STEP_TIMEOUT, self.conns.recv())
            .await
            .expect("timed out waiting for the client to connect")
            .expect("connector dropped")
    }

    /// Returns `true` if no connection is opened within `wait`.
    pub async fn no_connection_within(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.conns.recv()).await.is_err()
    }
}

/// One accepted connection, seen from the server side.
pub struct ServerConn {
    framed: Framed<DuplexStream, RespFrameCodec>,
    pub addr: SocketAddr,
}

impl ServerConn {
    fn new(stream: DuplexStream, addr: SocketAddr) -> Self {
        Self {
            framed: Framed::new(stream, RespFrameCodec),
            addr,
        }
    }

    /// Reads the next request and returns its parts as strings.
    pub async fn read_command(&mut self) -> Vec<String> {
        let frame = tokio::time::timeout(STEP_TIMEOUT, self.framed.next())
            .await
            .expect("timed out waiting for a command")
            .expect("client closed the connection")
            .expect("client sent an undecodable frame");
        match frame {
            RespFrame::Array(parts) => parts
                .into_iter()
                .map(|p| match p {
                    RespFrame::BulkString(b) => String::from_utf8_lossy(&b).into_owned(),
                    other => panic!("request part is not a bulk string: {other:?}"),
                })
                .collect(),
            other => panic!("request is not an array: {other:?}"),
        }
    }

    /// Reads the next request and asserts its exact parts.
    pub async fn expect(&mut self, expected: &[&str]) {
        let got = self.read_command().await;
        assert_eq!(got, expected, "unexpected request");
    }

    /// Returns `true` if the client sends nothing within `wait`.
    pub async fn silent_for(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.framed.next()).await.is_err()
    }

    pub async fn send(&mut self, frame: RespFrame) {
        self.framed.send(frame).await.expect("failed to write reply");
    }

    pub async fn ok(&mut self) {
        self.send(RespFrame::SimpleString("OK".into())).await;
    }

    pub async fn bulk(&mut self, value: &str) {
        self.send(RespFrame::BulkString(Bytes::from(value.to_string())))
            .await;
    }

    pub async fn integer(&mut self, value: i64) {
        self.send(RespFrame::Integer(value)).await;
    }

    pub async fn error(&mut self, message: &str) {
        self.send(RespFrame::Error(message.to_string())).await;
    }

    /// Confirms a (p)subscribe with one reply per name, as the server does.
    pub async fn confirm(&mut self, kind: &str, names: &[&str], start_count: i64) {
        for (i, name) in names.iter().enumerate() {
            self.send(RespFrame::Array(vec![
                bulk_frame(kind),
                bulk_frame(name),
                RespFrame::Integer(start_count + i as i64 + 1),
            ]))
            .await;
        }
    }

    pub async fn push_message(&mut self, channel: &str, payload: &str) {
        self.send(RespFrame::Array(vec![
            bulk_frame("message"),
            bulk_frame(channel),
            bulk_frame(payload),
        ]))
        .await;
    }

    pub async fn push_pmessage(&mut self, pattern: &str, channel: &str, payload: &str) {
        self.send(RespFrame::Array(vec![
            bulk_frame("pmessage"),
            bulk_frame(pattern),
            bulk_frame(channel),
            bulk_frame(payload),
        ]))
        .await;
    }

    /// Writes bytes that bypass the encoder, e.g. to corrupt the stream.
    pub async fn write_raw(&mut self, bytes: &[u8]) {
        let stream = self.framed.get_mut();
        stream.write_all(bytes).await.expect("failed to write raw bytes");
        stream.flush().await.expect("failed to flush");
    }
}

pub fn bulk_frame(value: &str) -> RespFrame {
    RespFrame::BulkString(Bytes::from(value.to_string()))
}

/// TestContext provides a connected client and the server end of its connection.
pub struct TestContext {
    pub client: SpinelClient,
    pub server: MockServer,
    pub conn: ServerConn,
}

impl TestContext {
    /// Creates a new test context with default configuration
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Creates a new test context with custom configuration.
    /// The config must not require a handshake.
    pub async fn with_config(config: ClientConfig) -> Self {
        init_tracing();
        let mut server = MockServer::new();
        let client = SpinelClient::builder(config)
            .resolver(test_resolver())
            .connector(server.connector())
            .connect()
            .await
            .expect("failed to connect the test client");
        let conn = server.accept().await;
        Self {
            client,
            server,
            conn,
        }
    }

    /// Closes the server end of the current connection.
    pub fn drop_connection(&mut self) {
        drop(std::mem::replace(&mut self.conn, ServerConn::detached()));
    }

    /// Drops the current server connection and waits for the replacement the client opens.
    pub async fn force_reconnect(&mut self) {
        self.drop_connection();
        self.conn = self.server.accept().await;
    }

    /// Waits until the client has noticed that its connection is gone.
    pub async fn wait_until_not_connected(&self) {
        let mut states = self.client.state_changes();
        tokio::time::timeout(
            STEP_TIMEOUT,
            states.wait_for(|s| *s != ConnectionState::Connected),
        )
        .await
        .expect("client never noticed the disconnect")
        .expect("state channel closed");
    }
}

impl ServerConn {
    /// A connection nobody is on the other end of.
    fn detached() -> Self {
        let (_client, server) = tokio::io::duplex(64);
        ServerConn::new(server, SocketAddr::from(([0, 0, 0, 0], 0)))
    }
}
