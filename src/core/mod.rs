// src/core/mod.rs

//! The central module containing the client engine: the wire protocol, the
//! per-connection dispatcher, Pub/Sub, cluster routing and name resolution.

pub mod client;
pub mod cluster;
pub mod command;
pub mod commands;
pub mod connection;
pub mod dns;
pub mod errors;
pub mod protocol;
pub mod pubsub;

pub use client::{ClientBuilder, SpinelClient};
pub use command::{Command, CommandHandle, CommandStatus};
pub use errors::ClientError;
pub use protocol::RespFrame;
