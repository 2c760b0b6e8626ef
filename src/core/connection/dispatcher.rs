// src/core/connection/dispatcher.rs

//! The task that owns one logical connection.
//!
//! It is the only place where the command queue is mutated, so reply order is
//! decided here and nowhere else. Callers hand it work through an MPSC channel.

use super::backpressure::OutboundGauge;
use super::queue::{CommandQueue, ReplyOutcome};
use super::reconnect::ReconnectionManager;
use super::transport::BoxedTransport;
use super::ConnectionState;
use crate::config::{ClientConfig, DisconnectedBehavior};
use crate::core::ClientError;
use crate::core::command::QueuedCommand;
use crate::core::protocol::incoming::subscription_count;
use crate::core::protocol::{Incoming, RespFrame, RespFrameCodec};
use crate::core::pubsub::PubSubRegistry;
use bytes::BytesMut;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

const WRITE_BUFFER_CAPACITY: usize = 16 * 1024;

/// Work submitted to a dispatcher.
pub(crate) enum Request {
    Command(QueuedCommand),
    /// Fails everything outstanding and stops the task. The sender is notified once done.
    Close(oneshot::Sender<()>),
}

/// Why `serve` returned.
enum ServeOutcome {
    Lost(ClientError),
    Closed,
}

pub(crate) struct Dispatcher {
    config: Arc<ClientConfig>,
    rx: mpsc::UnboundedReceiver<Request>,
    queue: CommandQueue,
    gauge: Arc<OutboundGauge>,
    registry: Arc<PubSubRegistry>,
    reconnector: Arc<ReconnectionManager>,
    state_tx: watch::Sender<ConnectionState>,
    /// Subscription count from the server's latest (un)subscribe confirmation.
    server_subscriptions: i64,
    /// Set once reconnection has given up; later submissions fail immediately.
    exhausted: bool,
    close_ack: Option<oneshot::Sender<()>>,
}

impl Dispatcher {
    pub(crate) fn new(
        config: Arc<ClientConfig>,
        rx: mpsc::UnboundedReceiver<Request>,
        gauge: Arc<OutboundGauge>,
        registry: Arc<PubSubRegistry>,
        reconnector: Arc<ReconnectionManager>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            config,
            rx,
            queue: CommandQueue::new(),
            gauge,
            registry,
            reconnector,
            state_tx,
            server_subscriptions: 0,
            exhausted: false,
            close_ack: None,
        }
    }

    /// Runs the connection until it is closed, reconnecting as configured.
    pub(crate) async fn run(mut self, transport: BoxedTransport) {
        let mut transport = Some(transport);
        while let Some(current) = transport.take() {
            self.transition(ConnectionState::Connected);
            self.on_connected();

            match self.serve(current).await {
                ServeOutcome::Closed => break,
                ServeOutcome::Lost(e) => {
                    warn!("Connection to {}:{} lost: {}", self.config.host, self.config.port, e);
                    self.transition(ConnectionState::Disconnected);
                    self.on_connection_lost(&e);
                    transport = self.reconnect().await;
                }
            }
        }
        self.shutdown();
    }

    fn transition(&self, next: ConnectionState) {
        let current = *self.state_tx.borrow();
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            error!("Invalid connection state transition {} -> {}", current, next);
            return;
        }
        debug!("Connection state {} -> {}", current, next);
        self.state_tx.send_replace(next);
    }

    /// Queues subscription replay ahead of everything else on a fresh connection.
    fn on_connected(&mut self) {
        self.exhausted = false;
        let mut replay = Vec::new();
        for command in self.registry.replay_commands() {
            match QueuedCommand::internal(command) {
                Ok(queued) => {
                    self.gauge.force_acquire(queued.len());
                    replay.push(queued);
                }
                Err(e) => warn!("Could not encode subscription replay: {}", e),
            }
        }
        if !replay.is_empty() {
            info!("Replaying {} subscription command(s)", replay.len());
            self.queue.push_front_all(replay);
        }
    }

    /// Serves one transport: writes queued commands, reads replies, accepts new work.
    async fn serve(&mut self, transport: BoxedTransport) -> ServeOutcome {
        let (read_half, mut write_half) = tokio::io::split(transport);
        let mut reader = FramedRead::new(read_half, RespFrameCodec);
        let mut out = BytesMut::with_capacity(WRITE_BUFFER_CAPACITY);

        let outcome = loop {
            let skipped = self.queue.write_pending(&mut out);
            self.gauge.release(skipped);

            tokio::select! {
                // Replies first: draining them keeps the in-flight queue short.
                biased;
                frame = reader.next() => match frame {
                    Some(Ok(frame)) => self.on_frame(frame),
                    Some(Err(e)) => break ServeOutcome::Lost(e),
                    None => break ServeOutcome::Lost(ClientError::Connection(
                        "connection closed by server".into(),
                    )),
                },
                written = write_half.write_buf(&mut out), if !out.is_empty() => match written {
                    Ok(0) => break ServeOutcome::Lost(ClientError::Connection(
                        "connection closed while writing".into(),
                    )),
                    Ok(n) => self.gauge.release(n),
                    Err(e) => break ServeOutcome::Lost(e.into()),
                },
                request = self.rx.recv() => match request {
                    Some(Request::Command(command)) => self.queue.push(command),
                    Some(Request::Close(ack)) => {
                        self.close_ack = Some(ack);
                        break ServeOutcome::Closed;
                    }
                    None => break ServeOutcome::Closed,
                },
            }
        };

        // Unwritten bytes will never be sent on this transport.
        self.gauge.release(out.len());
        if matches!(outcome, ServeOutcome::Closed) {
            let _ = write_half.shutdown().await;
        }
        outcome
    }

    fn on_frame(&mut self, frame: RespFrame) {
        let pubsub_active = self.server_subscriptions > 0 || !self.registry.is_empty();
        match Incoming::classify(frame, pubsub_active) {
            Incoming::Push(message) => {
                let delivered = self.registry.dispatch(&message);
                debug!(
                    "Delivered message on channel {:?} to {} listener(s)",
                    message.channel, delivered
                );
            }
            Incoming::Reply(frame) => {
                if let Some(count) = subscription_count(&frame) {
                    self.server_subscriptions = count;
                }
                match self.queue.complete_head(frame) {
                    ReplyOutcome::Unsolicited(frame) => {
                        warn!("Discarding reply with no pending command: {:?}", frame);
                    }
                    ReplyOutcome::Discarded => {
                        debug!("Discarded reply for a cancelled command");
                    }
                    ReplyOutcome::Completed | ReplyOutcome::Partial => {}
                }
            }
        }
    }

    /// Decides the fate of in-flight commands after the transport is gone.
    fn on_connection_lost(&mut self, cause: &ClientError) {
        self.server_subscriptions = 0;
        let in_flight = self.queue.take_in_flight();
        let reconnect = &self.config.reconnect;

        if reconnect.enabled && reconnect.retry_on_reconnect {
            let mut requeue = Vec::with_capacity(in_flight.len());
            for mut command in in_flight {
                // Subscription replay is regenerated on the next connection.
                if command.is_cancelled() || command.is_internal() {
                    continue;
                }
                command.reset_replies();
                self.gauge.force_acquire(command.len());
                requeue.push(command);
            }
            if !requeue.is_empty() {
                info!("Requeueing {} in-flight command(s) for the next connection", requeue.len());
            }
            self.queue.push_front_all(requeue);
        } else {
            let error = ClientError::Connection(cause.to_string());
            for command in in_flight {
                command.fail(error.clone());
            }
        }

        if !reconnect.enabled {
            self.exhausted = true;
            self.fail_pending(ClientError::Connection(cause.to_string()));
        }
    }

    /// Attempts to reconnect until it succeeds, gives up, or the client is closed.
    /// Returns `None` when the dispatcher should stop.
    async fn reconnect(&mut self) -> Option<BoxedTransport> {
        if !self.config.reconnect.enabled {
            return self.idle_until_closed().await;
        }
        let reconnector = self.reconnector.clone();
        let mut backoff = reconnector.backoff();
        loop {
            self.transition(ConnectionState::Connecting);
            let attempt = backoff.failures() + 1;
            match self.accepting_while(reconnector.establish()).await? {
                Ok(transport) => {
                    info!("Reconnected after {} attempt(s)", attempt);
                    return Some(transport);
                }
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempt, e);
                    self.transition(ConnectionState::Disconnected);
                    if self.config.reconnect.cancel_on_reconnect_failure {
                        self.fail_pending(ClientError::Connection(format!(
                            "reconnect attempt failed: {e}"
                        )));
                    }
                    let Some(delay) = backoff.next_delay() else {
                        error!("Giving up after {} reconnect attempt(s)", attempt);
                        self.exhausted = true;
                        self.fail_pending(ClientError::Connection(format!(
                            "reconnect attempts exhausted: {e}"
                        )));
                        return self.idle_until_closed().await;
                    };
                    debug!("Next reconnect attempt in {:?}", delay);
                    self.accepting_while(tokio::time::sleep(delay)).await?;
                }
            }
        }
    }

    /// Drives `fut` to completion while accepting submissions.
    /// Returns `None` if the client was closed in the meantime.
    async fn accepting_while<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                output = &mut fut => return Some(output),
                request = self.rx.recv() => {
                    if !self.accept_disconnected(request) {
                        return None;
                    }
                }
            }
        }
    }

    async fn idle_until_closed(&mut self) -> Option<BoxedTransport> {
        self.accepting_while(std::future::pending::<()>()).await;
        None
    }

    /// Handles a submission while there is no transport. Returns `false` on close.
    fn accept_disconnected(&mut self, request: Option<Request>) -> bool {
        let released = self.queue.reap_cancelled();
        self.gauge.release(released);

        let command = match request {
            Some(Request::Command(command)) => command,
            Some(Request::Close(ack)) => {
                self.close_ack = Some(ack);
                return false;
            }
            None => return false,
        };

        if self.exhausted {
            self.gauge.release(command.len());
            command.fail(ClientError::Connection(
                "not connected: reconnect attempts exhausted".into(),
            ));
        } else if self.config.buffer.disconnected_behavior == DisconnectedBehavior::Reject {
            self.gauge.release(command.len());
            command.fail(ClientError::NotConnected);
        } else {
            self.queue.push(command);
        }
        true
    }

    fn fail_pending(&mut self, error: ClientError) {
        for command in self.queue.take_pending() {
            self.gauge.release(command.len());
            command.fail(error.clone());
        }
    }

    /// Completes everything outstanding with `Closed` and enters the terminal state.
    fn shutdown(&mut self) {
        for command in self.queue.take_in_flight() {
            command.fail(ClientError::Closed);
        }
        self.fail_pending(ClientError::Closed);
        self.rx.close();
        while let Ok(request) = self.rx.try_recv() {
            match request {
                Request::Command(command) => {
                    self.gauge.release(command.len());
                    command.fail(ClientError::Closed);
                }
                Request::Close(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        self.transition(ConnectionState::Closed);
        info!("Connection to {}:{} closed", self.config.host, self.config.port);
        if let Some(ack) = self.close_ack.take() {
            let _ = ack.send(());
        }
    }
}
