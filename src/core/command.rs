// src/core/command.rs

//! The generic unit of work sent through a connection.
//!
//! A `Command` is only a request: a name plus bulk-string arguments. Submitting
//! it produces a `QueuedCommand` (owned by the connection's dispatcher) and a
//! `CommandHandle` (owned by the caller). The two share a `CommandState` cell
//! and a single-assignment completion channel.

use crate::core::ClientError;
use crate::core::protocol::{FromResp, RespFrame, RespFrameCodec};
use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Sleep;
use tokio_util::codec::Encoder;
use tracing::{debug, warn};

/// The outcome delivered to a command's completion slot.
pub type Completion = Result<RespFrame, ClientError>;

/// A request to be sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    name: Bytes,
    args: Vec<Bytes>,
    key: Option<Bytes>,
    expected_replies: usize,
}

impl Command {
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        Self {
            name: Bytes::copy_from_slice(name.as_ref()),
            args: Vec::new(),
            key: None,
            expected_replies: 1,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    /// Appends an argument that is already a `Bytes` without copying it.
    pub fn arg_bytes(mut self, arg: Bytes) -> Self {
        self.args.push(arg);
        self
    }

    pub fn arg_int(self, value: i64) -> Self {
        let mut buf = itoa::Buffer::new();
        let formatted = buf.format(value);
        self.arg(formatted)
    }

    pub fn arg_float(self, value: f64) -> Self {
        self.arg(value.to_string())
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.args
            .extend(args.into_iter().map(|a| Bytes::copy_from_slice(a.as_ref())));
        self
    }

    /// Appends a key argument. The first key also becomes the routing key used in cluster mode.
    pub fn key(mut self, key: impl AsRef<[u8]>) -> Self {
        let key = Bytes::copy_from_slice(key.as_ref());
        if self.key.is_none() {
            self.key = Some(key.clone());
        }
        self.args.push(key);
        self
    }

    /// Sets how many replies the server sends for this one request.
    /// `SUBSCRIBE a b c` is confirmed with three replies.
    pub fn expect_replies(mut self, count: usize) -> Self {
        self.expected_replies = count.max(1);
        self
    }

    /// Builds a command from a request frame (an array of bulk strings).
    pub fn from_frame(frame: RespFrame) -> Result<Self, ClientError> {
        let RespFrame::Array(parts) = frame else {
            return Err(ClientError::Encoding(
                "a request must be an array of bulk strings".into(),
            ));
        };
        let mut parts = parts.into_iter().map(|p| match p {
            RespFrame::BulkString(b) => Ok(b),
            other => Err(ClientError::Encoding(format!(
                "request arguments must be bulk strings, got {other:?}"
            ))),
        });
        let name = parts
            .next()
            .ok_or_else(|| ClientError::Encoding("empty request".into()))??;
        let args = parts.collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name,
            args,
            key: None,
            expected_replies: 1,
        })
    }

    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// The command name for log lines.
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).to_ascii_uppercase()
    }

    pub fn arguments(&self) -> &[Bytes] {
        &self.args
    }

    pub fn routing_key(&self) -> Option<&Bytes> {
        self.key.as_ref()
    }

    pub fn expected_replies(&self) -> usize {
        self.expected_replies
    }

    /// Converts the command into its request frame.
    pub fn to_frame(&self) -> RespFrame {
        RespFrame::Array(
            std::iter::once(&self.name)
                .chain(self.args.iter())
                .map(|b| RespFrame::BulkString(b.clone()))
                .collect(),
        )
    }

    /// Encodes the request into its wire form.
    pub fn encode(&self) -> Result<Bytes, ClientError> {
        if self.name.is_empty() {
            return Err(ClientError::Encoding("command name cannot be empty".into()));
        }
        let mut buf = BytesMut::with_capacity(
            16 + self.name.len() + self.args.iter().map(|a| a.len() + 16).sum::<usize>(),
        );
        RespFrameCodec.encode(self.to_frame(), &mut buf)?;
        Ok(buf.freeze())
    }
}

/// Lifecycle of a submitted command. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandStatus {
    Pending = 0,
    Sent = 1,
    Completed = 2,
    Cancelled = 3,
}

impl CommandStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => CommandStatus::Pending,
            1 => CommandStatus::Sent,
            2 => CommandStatus::Completed,
            _ => CommandStatus::Cancelled,
        }
    }
}

/// The state cell shared between the dispatcher and the caller's handle.
#[derive(Debug)]
pub struct CommandState(AtomicU8);

impl Default for CommandState {
    fn default() -> Self {
        Self(AtomicU8::new(CommandStatus::Pending as u8))
    }
}

impl CommandState {
    pub fn status(&self) -> CommandStatus {
        CommandStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    fn transition(&self, from: CommandStatus, to: CommandStatus) -> Result<(), CommandStatus> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(CommandStatus::from_u8)
    }

    /// Marks the command as written. A command resent after a reconnect is already `Sent`.
    pub fn mark_sent(&self) -> bool {
        match self.transition(CommandStatus::Pending, CommandStatus::Sent) {
            Ok(()) | Err(CommandStatus::Sent) => true,
            Err(_) => false,
        }
    }

    /// Moves a Pending or Sent command to `Completed`. Returns `false` if it was cancelled first.
    pub fn complete(&self) -> bool {
        let mut current = self.status();
        loop {
            match current {
                CommandStatus::Pending | CommandStatus::Sent => {
                    match self.transition(current, CommandStatus::Completed) {
                        Ok(()) => return true,
                        Err(actual) => current = actual,
                    }
                }
                CommandStatus::Completed | CommandStatus::Cancelled => return false,
            }
        }
    }

    /// Moves a Pending or Sent command to `Cancelled`. A no-op on finished commands.
    pub fn cancel(&self) -> bool {
        let mut current = self.status();
        loop {
            match current {
                CommandStatus::Pending | CommandStatus::Sent => {
                    match self.transition(current, CommandStatus::Cancelled) {
                        Ok(()) => return true,
                        Err(actual) => current = actual,
                    }
                }
                CommandStatus::Completed | CommandStatus::Cancelled => return false,
            }
        }
    }
}

/// The dispatcher-side half of a submitted command.
#[derive(Debug)]
pub struct QueuedCommand {
    name: String,
    request: Bytes,
    state: Arc<CommandState>,
    tx: Option<oneshot::Sender<Completion>>,
    expected_replies: usize,
    remaining_replies: usize,
}

impl QueuedCommand {
    /// Encodes `command` and splits it into the queue entry and the caller's handle.
    pub fn new<T: FromResp>(command: Command) -> Result<(Self, CommandHandle<T>), ClientError> {
        let request = command.encode()?;
        let state = Arc::new(CommandState::default());
        let (tx, rx) = oneshot::channel();
        let queued = Self {
            name: command.name_lossy(),
            request,
            state: state.clone(),
            tx: Some(tx),
            expected_replies: command.expected_replies,
            remaining_replies: command.expected_replies,
        };
        Ok((queued, CommandHandle::new(rx, state)))
    }

    /// A command issued by the connection itself (e.g. subscription replay). Nobody awaits it.
    pub fn internal(command: Command) -> Result<Self, ClientError> {
        Ok(Self {
            name: command.name_lossy(),
            request: command.encode()?,
            state: Arc::new(CommandState::default()),
            tx: None,
            expected_replies: command.expected_replies,
            remaining_replies: command.expected_replies,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request(&self) -> &Bytes {
        &self.request
    }

    /// Encoded size in bytes, the unit used by the outbound gauge.
    pub fn len(&self) -> usize {
        self.request.len()
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_empty()
    }

    pub fn state(&self) -> &CommandState {
        &self.state
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.status() == CommandStatus::Cancelled
    }

    pub fn is_internal(&self) -> bool {
        self.tx.is_none()
    }

    /// Consumes one reply. Returns `true` when this was the last reply the command expects.
    pub(crate) fn take_reply(&mut self) -> bool {
        self.remaining_replies = self.remaining_replies.saturating_sub(1);
        self.remaining_replies == 0
    }

    /// Replies still owed before the command completes.
    pub fn remaining_replies(&self) -> usize {
        self.remaining_replies
    }

    /// Expects the full reply count again. A resent request is answered in full.
    pub fn reset_replies(&mut self) {
        self.remaining_replies = self.expected_replies;
    }

    /// Delivers the result. Returns `false` if the command was cancelled and the result discarded.
    pub fn complete(mut self, result: Completion) -> bool {
        if !self.state.complete() {
            return false;
        }
        match self.tx.take() {
            Some(tx) => {
                // The caller may have dropped its handle; that is not an error.
                let _ = tx.send(result);
            }
            None => {
                if let Err(e) = result {
                    warn!("Internal command {} failed: {}", self.name, e);
                }
            }
        }
        true
    }

    pub fn fail(self, error: ClientError) -> bool {
        debug!("Failing command {}: {}", self.name, error);
        self.complete(Err(error))
    }
}

/// A future that resolves to the typed reply of a submitted command.
///
/// Dropping the handle does not cancel the command. Call `cancel` for that.
pub struct CommandHandle<T> {
    rx: oneshot::Receiver<Completion>,
    state: Arc<CommandState>,
    timeout: Option<Duration>,
    /// Armed on first poll, so building a handle needs no runtime.
    deadline: Option<Pin<Box<Sleep>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for CommandHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandle")
            .field("status", &self.state.status())
            .finish()
    }
}

impl<T: FromResp> CommandHandle<T> {
    fn new(rx: oneshot::Receiver<Completion>, state: Arc<CommandState>) -> Self {
        Self {
            rx,
            state,
            timeout: None,
            deadline: None,
            _marker: PhantomData,
        }
    }

    /// A handle that resolves to `error` right away. Submission never fails synchronously.
    pub fn failed(error: ClientError) -> Self {
        let (tx, rx) = oneshot::channel();
        let state = Arc::new(CommandState::default());
        state.complete();
        let _ = tx.send(Err(error));
        Self::new(rx, state)
    }

    /// Cancels the command if it has not completed yet when `timeout` elapses,
    /// resolving the handle with `Timeout`. The queue slot is kept.
    ///
    /// The clock starts when the handle is first polled.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self.deadline = None;
        self
    }

    pub fn status(&self) -> CommandStatus {
        self.state.status()
    }

    /// Requests cancellation. Idempotent; returns `false` if the command had already finished.
    pub fn cancel(&self) -> bool {
        self.state.cancel()
    }
}

impl<T: FromResp> Future for CommandHandle<T> {
    type Output = Result<T, ClientError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(Ok(frame))) => return Poll::Ready(T::from_resp(frame)),
            Poll::Ready(Ok(Err(e))) => return Poll::Ready(Err(e)),
            Poll::Ready(Err(_)) => {
                // The sender was dropped without a result.
                let error = match this.state.status() {
                    CommandStatus::Cancelled => ClientError::Cancelled,
                    _ => ClientError::Closed,
                };
                return Poll::Ready(Err(error));
            }
            Poll::Pending => {}
        }

        if this.state.status() == CommandStatus::Cancelled {
            return Poll::Ready(Err(ClientError::Cancelled));
        }

        if this.deadline.is_none()
            && let Some(timeout) = this.timeout
        {
            this.deadline = Some(Box::pin(tokio::time::sleep(timeout)));
        }
        if let Some(deadline) = this.deadline.as_mut()
            && deadline.as_mut().poll(cx).is_ready()
            && this.state.cancel()
        {
            return Poll::Ready(Err(ClientError::Timeout));
        }

        Poll::Pending
    }
}
