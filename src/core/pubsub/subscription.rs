// src/core/pubsub/subscription.rs

use super::{PubSubRegistry, SubscriptionKind};
use crate::core::protocol::PushMessage;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// A live subscription to one or more channels or patterns.
///
/// It survives reconnection: the dispatcher resubscribes on every new
/// connection. Dropping it removes its listener locally; the server side is
/// only told through an explicit unsubscribe.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    kind: SubscriptionKind,
    names: Vec<Bytes>,
    rx: mpsc::UnboundedReceiver<PushMessage>,
    registry: Arc<PubSubRegistry>,
}

impl Subscription {
    pub(super) fn new(
        id: u64,
        kind: SubscriptionKind,
        names: Vec<Bytes>,
        rx: mpsc::UnboundedReceiver<PushMessage>,
        registry: Arc<PubSubRegistry>,
    ) -> Self {
        Self {
            id,
            kind,
            names,
            rx,
            registry,
        }
    }

    pub fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    pub fn names(&self) -> &[Bytes] {
        &self.names
    }

    /// Waits for the next message. `None` once every name was unsubscribed.
    pub async fn recv(&mut self) -> Option<PushMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PushMessage> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = PushMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.remove_listener(self.kind, self.id, &self.names);
    }
}
