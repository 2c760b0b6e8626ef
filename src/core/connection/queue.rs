// src/core/connection/queue.rs

//! The ordered record of commands owned by one connection.
//!
//! Commands move from `pending` (accepted, not yet written) to `in_flight`
//! (written, awaiting a reply). The server answers pipelined requests strictly
//! in order, so the head of `in_flight` always owns the next reply.

use crate::core::ClientError;
use crate::core::command::QueuedCommand;
use crate::core::protocol::RespFrame;
use bytes::BytesMut;
use std::collections::VecDeque;

/// What happened to a reply handed to `complete_head`.
#[derive(Debug, PartialEq)]
pub enum ReplyOutcome {
    /// The head command received its result.
    Completed,
    /// The head command expects more replies (multi-channel subscribe).
    Partial,
    /// The head command had been cancelled after it was sent; the reply was dropped.
    Discarded,
    /// Nothing was waiting for this reply.
    Unsolicited(RespFrame),
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: VecDeque<QueuedCommand>,
    in_flight: VecDeque<QueuedCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: QueuedCommand) {
        self.pending.push_back(command);
    }

    /// Puts commands ahead of everything pending, keeping their relative order.
    pub fn push_front_all(&mut self, commands: Vec<QueuedCommand>) {
        for command in commands.into_iter().rev() {
            self.pending.push_front(command);
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len() + self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Encodes every pending command into `out` and marks it `Sent`.
    ///
    /// Commands cancelled before being written are completed as cancelled and
    /// skipped; they never occupy a reply slot. Returns the number of bytes
    /// those skipped commands had reserved.
    pub fn write_pending(&mut self, out: &mut BytesMut) -> usize {
        let mut skipped = 0;
        while let Some(command) = self.pending.pop_front() {
            if !command.state().mark_sent() {
                skipped += command.len();
                continue;
            }
            out.extend_from_slice(command.request());
            self.in_flight.push_back(command);
        }
        skipped
    }

    /// Drops pending commands that were cancelled. Returns the bytes they had reserved.
    pub fn reap_cancelled(&mut self) -> usize {
        let mut reaped = 0;
        self.pending.retain(|c| {
            if c.is_cancelled() {
                reaped += c.len();
                false
            } else {
                true
            }
        });
        reaped
    }

    /// Matches one reply against the head of the in-flight queue.
    ///
    /// A cancelled head still consumes its reply slot.
    pub fn complete_head(&mut self, frame: RespFrame) -> ReplyOutcome {
        let Some(head) = self.in_flight.front_mut() else {
            return ReplyOutcome::Unsolicited(frame);
        };
        let error = match &frame {
            RespFrame::Error(message) => Some(ClientError::from_server_reply(message)),
            _ => None,
        };
        // An error reply ends a multi-reply command early.
        if !head.take_reply() && error.is_none() {
            return ReplyOutcome::Partial;
        }
        let Some(head) = self.in_flight.pop_front() else {
            return ReplyOutcome::Unsolicited(frame);
        };
        let result = match error {
            Some(e) => Err(e),
            None => Ok(frame),
        };
        if head.complete(result) {
            ReplyOutcome::Completed
        } else {
            ReplyOutcome::Discarded
        }
    }

    /// Removes and returns every written-but-unanswered command, oldest first.
    pub fn take_in_flight(&mut self) -> Vec<QueuedCommand> {
        self.in_flight.drain(..).collect()
    }

    /// Removes and returns every not-yet-written command, oldest first.
    pub fn take_pending(&mut self) -> Vec<QueuedCommand> {
        self.pending.drain(..).collect()
    }
}
