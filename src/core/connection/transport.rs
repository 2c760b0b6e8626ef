// src/core/connection/transport.rs

//! Abstracts the byte stream a dispatcher runs on, so tests can substitute an
//! in-memory duplex for a TCP socket.

use crate::core::ClientError;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Any bidirectional byte stream the client can speak RESP over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Transport for T {}

pub type BoxedTransport = Box<dyn Transport>;

/// Opens a transport to one resolved address.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, addr: SocketAddr) -> Result<BoxedTransport, ClientError>;
}

/// The production connector: plain TCP with `TCP_NODELAY`.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: SocketAddr) -> Result<BoxedTransport, ClientError> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Connection(format!("connect to {addr} timed out")))??;
        stream.set_nodelay(true)?;
        debug!("TCP connection established to {}", addr);
        Ok(Box::new(stream))
    }
}
