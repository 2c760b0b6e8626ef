// src/core/errors.rs

//! Defines the primary error type for the entire client library.

use std::num::{ParseFloatError, ParseIntError};
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing every failure a caller can observe.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// Internal decoder signal: the buffer holds a partial frame. Never delivered to callers.
    #[error("Incomplete data in stream")]
    IncompleteData,

    /// The request could not be represented on the wire. Never reaches the network.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The reply stream is malformed. Fatal to the connection that produced it.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An error reply sent by the server. Completes exactly one command.
    #[error("{0}")]
    Server(String),

    /// The reply was well-formed but did not match the type the caller asked for.
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// The transport failed or the connection was lost.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The command was submitted while disconnected and buffering is disabled.
    #[error("Not connected")]
    NotConnected,

    /// The outbound buffer is above its high-water mark. Retry later.
    #[error("Outbound buffer is full")]
    Backpressure,

    #[error("Unknown host '{host}': {reason}")]
    UnknownHost { host: String, reason: String },

    #[error("Command cancelled")]
    Cancelled,

    #[error("Command timed out")]
    Timeout,

    /// The client was closed explicitly.
    #[error("Client closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    Config(String),

    // --- Cluster-specific errors ---
    /// A redirect error indicating that a key/slot has moved to a different node.
    #[error("MOVED {slot} {addr}")]
    Moved { slot: u16, addr: String },

    /// A temporary redirect error for a slot that is currently being migrated.
    #[error("ASK {slot} {addr}")]
    Ask { slot: u16, addr: String },

    /// An error indicating that no node could serve the request.
    #[error("CLUSTERDOWN {0}")]
    ClusterDown(String),
}

impl ClientError {
    /// Builds the error for a server error reply, recognizing cluster redirections.
    pub fn from_server_reply(message: &str) -> Self {
        let mut parts = message.split_whitespace();
        let kind = parts.next().unwrap_or_default();
        if kind == "MOVED" || kind == "ASK" {
            if let (Some(slot), Some(addr)) = (parts.next(), parts.next())
                && let Ok(slot) = slot.parse::<u16>()
            {
                let addr = addr.to_string();
                return if kind == "MOVED" {
                    ClientError::Moved { slot, addr }
                } else {
                    ClientError::Ask { slot, addr }
                };
            }
        }
        ClientError::Server(message.to_string())
    }

    /// Returns `true` for failures caused by the transport rather than by the command.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Connection(_)
                | ClientError::NotConnected
                | ClientError::Protocol(_)
        )
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for ClientError {
    fn clone(&self) -> Self {
        match self {
            ClientError::Io(e) => ClientError::Io(Arc::clone(e)),
            ClientError::IncompleteData => ClientError::IncompleteData,
            ClientError::Encoding(s) => ClientError::Encoding(s.clone()),
            ClientError::Protocol(s) => ClientError::Protocol(s.clone()),
            ClientError::Server(s) => ClientError::Server(s.clone()),
            ClientError::UnexpectedReply(s) => ClientError::UnexpectedReply(s.clone()),
            ClientError::Connection(s) => ClientError::Connection(s.clone()),
            ClientError::NotConnected => ClientError::NotConnected,
            ClientError::Backpressure => ClientError::Backpressure,
            ClientError::UnknownHost { host, reason } => ClientError::UnknownHost {
                host: host.clone(),
                reason: reason.clone(),
            },
            ClientError::Cancelled => ClientError::Cancelled,
            ClientError::Timeout => ClientError::Timeout,
            ClientError::Closed => ClientError::Closed,
            ClientError::Config(s) => ClientError::Config(s.clone()),
            ClientError::Moved { slot, addr } => ClientError::Moved {
                slot: *slot,
                addr: addr.clone(),
            },
            ClientError::Ask { slot, addr } => ClientError::Ask {
                slot: *slot,
                addr: addr.clone(),
            },
            ClientError::ClusterDown(s) => ClientError::ClusterDown(s.clone()),
        }
    }
}

impl PartialEq for ClientError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ClientError::Io(e1), ClientError::Io(e2)) => e1.to_string() == e2.to_string(),
            (ClientError::Encoding(s1), ClientError::Encoding(s2)) => s1 == s2,
            (ClientError::Protocol(s1), ClientError::Protocol(s2)) => s1 == s2,
            (ClientError::Server(s1), ClientError::Server(s2)) => s1 == s2,
            (ClientError::UnexpectedReply(s1), ClientError::UnexpectedReply(s2)) => s1 == s2,
            (ClientError::Connection(s1), ClientError::Connection(s2)) => s1 == s2,
            (ClientError::Config(s1), ClientError::Config(s2)) => s1 == s2,
            (ClientError::ClusterDown(s1), ClientError::ClusterDown(s2)) => s1 == s2,
            (
                ClientError::UnknownHost { host: h1, .. },
                ClientError::UnknownHost { host: h2, .. },
            ) => h1 == h2,
            (
                ClientError::Moved { slot: s1, addr: a1 },
                ClientError::Moved { slot: s2, addr: a2 },
            ) => s1 == s2 && a1 == a2,
            (ClientError::Ask { slot: s1, addr: a1 }, ClientError::Ask { slot: s2, addr: a2 }) => {
                s1 == s2 && a1 == a2
            }
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(Arc::new(e))
    }
}

impl From<std::str::Utf8Error> for ClientError {
    fn from(e: std::str::Utf8Error) -> Self {
        ClientError::UnexpectedReply(format!("reply is not valid UTF-8: {e}"))
    }
}

impl From<std::string::FromUtf8Error> for ClientError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        ClientError::UnexpectedReply(format!("reply is not valid UTF-8: {e}"))
    }
}

impl From<ParseIntError> for ClientError {
    fn from(e: ParseIntError) -> Self {
        ClientError::UnexpectedReply(format!("reply is not an integer: {e}"))
    }
}

impl From<ParseFloatError> for ClientError {
    fn from(e: ParseFloatError) -> Self {
        ClientError::UnexpectedReply(format!("reply is not a valid float: {e}"))
    }
}

impl From<tokio::time::error::Elapsed> for ClientError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ClientError::Timeout
    }
}
