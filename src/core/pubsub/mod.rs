// src/core/pubsub/mod.rs

//! Client-side Pub/Sub: which channels and patterns this connection listens
//! to, and who receives the messages the server pushes for them.

use crate::core::command::Command;
use crate::core::protocol::PushMessage;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

mod subscription;

pub use subscription::Subscription;

/// Whether a subscription targets exact channel names or glob patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Channel,
    Pattern,
}

impl SubscriptionKind {
    pub fn subscribe_command(self) -> &'static str {
        match self {
            SubscriptionKind::Channel => "SUBSCRIBE",
            SubscriptionKind::Pattern => "PSUBSCRIBE",
        }
    }

    pub fn unsubscribe_command(self) -> &'static str {
        match self {
            SubscriptionKind::Channel => "UNSUBSCRIBE",
            SubscriptionKind::Pattern => "PUNSUBSCRIBE",
        }
    }
}

#[derive(Debug)]
struct Listener {
    id: u64,
    tx: mpsc::UnboundedSender<PushMessage>,
}

/// `PubSubRegistry` maps channels and patterns to their listeners.
///
/// It is written by `subscribe`/`unsubscribe` on caller tasks and read by the
/// dispatcher when a push message arrives, hence the `DashMap`s.
#[derive(Debug, Default)]
pub struct PubSubRegistry {
    channels: DashMap<Bytes, Vec<Listener>>,
    patterns: DashMap<Bytes, Vec<Listener>>,
    next_id: AtomicU64,
}

impl PubSubRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    fn map(&self, kind: SubscriptionKind) -> &DashMap<Bytes, Vec<Listener>> {
        match kind {
            SubscriptionKind::Channel => &self.channels,
            SubscriptionKind::Pattern => &self.patterns,
        }
    }

    /// Registers one listener for all `names`. Messages start flowing to the
    /// returned `Subscription` as soon as the server confirms.
    pub fn subscribe(self: &Arc<Self>, kind: SubscriptionKind, names: Vec<Bytes>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        for name in &names {
            self.map(kind).entry(name.clone()).or_default().push(Listener {
                id,
                tx: tx.clone(),
            });
        }
        Subscription::new(id, kind, names, rx, self.clone())
    }

    /// Forgets every listener of `names`. Their subscriptions see the end of the stream.
    pub fn unsubscribe(&self, kind: SubscriptionKind, names: &[Bytes]) {
        for name in names {
            self.map(kind).remove(name);
        }
    }

    /// Removes a single listener, dropping names that have no listeners left.
    pub(crate) fn remove_listener(&self, kind: SubscriptionKind, id: u64, names: &[Bytes]) {
        let map = self.map(kind);
        for name in names {
            if let Some(mut listeners) = map.get_mut(name) {
                listeners.retain(|l| l.id != id);
            }
            map.remove_if(name, |_, listeners| listeners.is_empty());
        }
    }

    /// Routes a push message to its listeners. Returns how many received it.
    pub fn dispatch(&self, message: &PushMessage) -> usize {
        let (map, key) = match &message.pattern {
            Some(pattern) => (&self.patterns, pattern),
            None => (&self.channels, &message.channel),
        };
        let Some(mut listeners) = map.get_mut(key) else {
            debug!("No listener for push message on {:?}", key);
            return 0;
        };
        // Listeners whose receiver is gone are pruned on the way.
        listeners.retain(|l| l.tx.send(message.clone()).is_ok());
        listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.patterns.is_empty()
    }

    /// Returns a list of all channels with at least one listener.
    pub fn channels(&self) -> Vec<Bytes> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    /// Returns a list of all patterns with at least one listener.
    pub fn patterns(&self) -> Vec<Bytes> {
        self.patterns.iter().map(|e| e.key().clone()).collect()
    }

    /// The commands that restore every registered subscription on a new connection.
    pub fn replay_commands(&self) -> Vec<Command> {
        [SubscriptionKind::Channel, SubscriptionKind::Pattern]
            .into_iter()
            .filter_map(|kind| {
                let names = match kind {
                    SubscriptionKind::Channel => self.channels(),
                    SubscriptionKind::Pattern => self.patterns(),
                };
                if names.is_empty() {
                    return None;
                }
                let count = names.len();
                Some(
                    Command::new(kind.subscribe_command())
                        .args(names)
                        .expect_replies(count),
                )
            })
            .collect()
    }
}
