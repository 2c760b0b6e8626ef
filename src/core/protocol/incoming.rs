// src/core/protocol/incoming.rs

//! Classifies decoded frames into replies (matched against the command queue)
//! and server-pushed Pub/Sub messages (routed to listeners).

use super::RespFrame;
use bytes::Bytes;

/// A message published to a channel the connection is subscribed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    /// The pattern that matched, for messages delivered through `PSUBSCRIBE`.
    pub pattern: Option<Bytes>,
    pub channel: Bytes,
    pub payload: Bytes,
}

/// The result of classifying one decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Reply(RespFrame),
    Push(PushMessage),
}

impl Incoming {
    /// Classifies a frame.
    ///
    /// Push detection only runs while `pubsub_active` is set: outside of Pub/Sub a
    /// regular array reply may legitimately start with the word "message".
    pub fn classify(frame: RespFrame, pubsub_active: bool) -> Self {
        if !pubsub_active {
            return Incoming::Reply(frame);
        }
        match PushMessage::from_frame(&frame) {
            Some(push) => Incoming::Push(push),
            None => Incoming::Reply(frame),
        }
    }
}

impl PushMessage {
    /// Recognizes `["message", channel, payload]` and
    /// `["pmessage", pattern, channel, payload]`.
    pub fn from_frame(frame: &RespFrame) -> Option<Self> {
        let RespFrame::Array(parts) = frame else {
            return None;
        };
        let kind = parts.first()?.as_bytes()?;
        match (kind, parts.len()) {
            (k, 3) if k.eq_ignore_ascii_case(b"message") => Some(PushMessage {
                pattern: None,
                channel: bulk(&parts[1])?,
                payload: bulk(&parts[2])?,
            }),
            (k, 4) if k.eq_ignore_ascii_case(b"pmessage") => Some(PushMessage {
                pattern: Some(bulk(&parts[1])?),
                channel: bulk(&parts[2])?,
                payload: bulk(&parts[3])?,
            }),
            _ => None,
        }
    }
}

/// Reads the remaining subscription count from a `(p)(un)subscribe` confirmation.
pub fn subscription_count(frame: &RespFrame) -> Option<i64> {
    let RespFrame::Array(parts) = frame else {
        return None;
    };
    let kind = parts.first()?.as_bytes()?;
    let is_confirmation = [
        &b"subscribe"[..],
        b"unsubscribe",
        b"psubscribe",
        b"punsubscribe",
    ]
    .iter()
    .any(|k| kind.eq_ignore_ascii_case(k));
    match (is_confirmation, parts.get(2)) {
        (true, Some(RespFrame::Integer(count))) => Some(*count),
        _ => None,
    }
}

fn bulk(frame: &RespFrame) -> Option<Bytes> {
    match frame {
        RespFrame::BulkString(b) => Some(b.clone()),
        RespFrame::SimpleString(s) => Some(Bytes::from(s.clone())),
        _ => None,
    }
}
