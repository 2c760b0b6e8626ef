// src/core/client.rs

//! The public entry point for talking to a single server.

use crate::config::ClientConfig;
use crate::core::ClientError;
use crate::core::command::{Command, CommandHandle, QueuedCommand};
use crate::core::connection::{
    ConnectionState, Connector, Dispatcher, OutboundGauge, ReconnectionManager, Request,
    TcpConnector,
};
use crate::core::dns::{DnsResolver, resolver_from_config};
use crate::core::protocol::{FromResp, RespFrame};
use crate::core::pubsub::{PubSubRegistry, Subscription, SubscriptionKind};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

/// Configures and opens a `SpinelClient`.
pub struct ClientBuilder {
    config: ClientConfig,
    resolver: Option<Arc<dyn DnsResolver>>,
    connector: Option<Arc<dyn Connector>>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            resolver: None,
            connector: None,
        }
    }

    /// Overrides host name resolution. Defaults to the resolver described by `config.dns`.
    pub fn resolver(mut self, resolver: Arc<dyn DnsResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Overrides how transports are opened. Defaults to TCP.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Establishes the first connection and starts the dispatcher task.
    ///
    /// Unlike later reconnections, a failure here is returned to the caller.
    pub async fn connect(self) -> Result<SpinelClient, ClientError> {
        self.config
            .validate()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        let config = Arc::new(self.config);
        let resolver = match self.resolver {
            Some(resolver) => resolver,
            None => resolver_from_config(&config.dns)?,
        };
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TcpConnector::new(config.connect_timeout)));

        let reconnector = Arc::new(ReconnectionManager::new(
            config.clone(),
            resolver,
            connector,
        ));
        let transport = reconnector.establish().await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let gauge = Arc::new(OutboundGauge::new(
            config.buffer.high_watermark,
            config.buffer.low_watermark,
        ));
        let registry = Arc::new(PubSubRegistry::new());

        let dispatcher = Dispatcher::new(
            config.clone(),
            rx,
            gauge.clone(),
            registry.clone(),
            reconnector,
            state_tx,
        );
        tokio::spawn(dispatcher.run(transport));

        Ok(SpinelClient {
            inner: Arc::new(ClientInner {
                config,
                tx,
                gauge,
                registry,
                state_rx,
            }),
        })
    }
}

struct ClientInner {
    config: Arc<ClientConfig>,
    tx: mpsc::UnboundedSender<Request>,
    gauge: Arc<OutboundGauge>,
    registry: Arc<PubSubRegistry>,
    state_rx: watch::Receiver<ConnectionState>,
}

/// A handle to one logical connection. Cheap to clone; all clones share the
/// same connection and command queue. The connection closes when the last
/// clone is dropped or `close` is called.
#[derive(Clone)]
pub struct SpinelClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for SpinelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpinelClient")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("state", &self.state())
            .finish()
    }
}

impl SpinelClient {
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Connects with the default resolver and TCP transport.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        ClientBuilder::new(config).connect().await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Submits a command and returns a handle to its typed reply.
    ///
    /// Never blocks and never fails synchronously: encoding errors,
    /// backpressure and closed connections are reported through the handle.
    pub fn send<T: FromResp>(&self, command: Command) -> CommandHandle<T> {
        let (queued, handle) = match QueuedCommand::new::<T>(command) {
            Ok(pair) => pair,
            Err(e) => return CommandHandle::failed(e),
        };
        let handle = match self.inner.config.command_timeout {
            Some(timeout) => handle.with_timeout(timeout),
            None => handle,
        };

        if let Err(e) = self.inner.gauge.try_acquire(queued.len()) {
            queued.fail(e);
            return handle;
        }
        if let Err(mpsc::error::SendError(request)) =
            self.inner.tx.send(Request::Command(queued))
            && let Request::Command(queued) = request
        {
            self.inner.gauge.release(queued.len());
            queued.fail(ClientError::Closed);
        }
        handle
    }

    /// Sends a command and waits for its reply.
    pub async fn execute<T: FromResp>(&self, command: Command) -> Result<T, ClientError> {
        self.send(command).await
    }

    /// Subscribes to channels. The returned subscription keeps receiving
    /// messages across reconnections.
    pub async fn subscribe<I, A>(&self, channels: I) -> Result<Subscription, ClientError>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.subscribe_kind(SubscriptionKind::Channel, channels).await
    }

    /// Subscribes to glob-style channel patterns.
    pub async fn psubscribe<I, A>(&self, patterns: I) -> Result<Subscription, ClientError>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.subscribe_kind(SubscriptionKind::Pattern, patterns).await
    }

    pub async fn unsubscribe<I, A>(&self, channels: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.unsubscribe_kind(SubscriptionKind::Channel, channels).await
    }

    pub async fn punsubscribe<I, A>(&self, patterns: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.unsubscribe_kind(SubscriptionKind::Pattern, patterns).await
    }

    async fn subscribe_kind<I, A>(
        &self,
        kind: SubscriptionKind,
        names: I,
    ) -> Result<Subscription, ClientError>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let names = collect_names(names)?;
        // Register first so no message that follows the confirmation is missed.
        let subscription = self.inner.registry.subscribe(kind, names.clone());
        let count = names.len();
        let command = Command::new(kind.subscribe_command())
            .args(&names)
            .expect_replies(count);
        self.send::<RespFrame>(command).await?;
        debug!("Subscribed to {} {:?}", count, kind);
        Ok(subscription)
    }

    async fn unsubscribe_kind<I, A>(&self, kind: SubscriptionKind, names: I) -> Result<(), ClientError>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let names = collect_names(names)?;
        self.inner.registry.unsubscribe(kind, &names);
        let count = names.len();
        let command = Command::new(kind.unsubscribe_command())
            .args(&names)
            .expect_replies(count);
        self.send::<RespFrame>(command).await?;
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// A receiver that observes every connection state change.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// Waits until the connection reaches `state`. Fails with `Closed` if it
    /// closes first (unless `Closed` was the target).
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<(), ClientError> {
        let mut rx = self.state_changes();
        let reached = rx
            .wait_for(|s| *s == state || *s == ConnectionState::Closed)
            .await
            .map(|s| *s)
            .unwrap_or(ConnectionState::Closed);
        if reached == state {
            Ok(())
        } else {
            Err(ClientError::Closed)
        }
    }

    /// Bytes accepted for sending but not yet written.
    pub fn outbound_bytes(&self) -> usize {
        self.inner.gauge.outstanding()
    }

    /// Closes the connection. Outstanding commands fail with `Closed`.
    pub async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.inner.tx.send(Request::Close(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

fn collect_names<I, A>(names: I) -> Result<Vec<Bytes>, ClientError>
where
    I: IntoIterator<Item = A>,
    A: AsRef<[u8]>,
{
    let names: Vec<Bytes> = names
        .into_iter()
        .map(|n| Bytes::copy_from_slice(n.as_ref()))
        .collect();
    if names.is_empty() {
        return Err(ClientError::Encoding(
            "at least one channel or pattern is required".into(),
        ));
    }
    Ok(names)
}
