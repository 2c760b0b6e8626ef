// src/lib.rs

pub mod config;
pub mod core;

// Re-export
pub use crate::config::ClientConfig;
pub use crate::core::cluster::ClusterClient;
pub use crate::core::commands::{ConnectionCommands, Executor, StringCommands};
pub use crate::core::{
    ClientBuilder, ClientError, Command, CommandHandle, CommandStatus, RespFrame, SpinelClient,
};
