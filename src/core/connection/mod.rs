// src/core/connection/mod.rs

//! Drives a single physical connection: the command queue, the dispatcher task
//! that owns it, and the reconnection logic that replaces a lost transport.

mod backpressure;
mod dispatcher;
mod queue;
mod reconnect;
mod transport;

pub use backpressure::OutboundGauge;
pub(crate) use dispatcher::{Dispatcher, Request};
pub use queue::{CommandQueue, ReplyOutcome};
pub use reconnect::{Backoff, ReconnectionManager};
pub use transport::{BoxedTransport, Connector, TcpConnector, Transport};

/// The lifecycle of a logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    /// Terminal. Reached only through an explicit close.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Disconnected, Connecting)
                | (Connecting | Connected | Disconnected, Closed)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}
