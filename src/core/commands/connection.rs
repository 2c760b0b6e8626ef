// src/core/commands/connection.rs

use crate::core::command::Command;

pub fn ping() -> Command {
    Command::new("PING")
}

pub fn echo(message: impl AsRef<[u8]>) -> Command {
    Command::new("ECHO").arg(message)
}

pub fn publish(channel: impl AsRef<[u8]>, message: impl AsRef<[u8]>) -> Command {
    // The channel doubles as the routing key in cluster mode.
    Command::new("PUBLISH").key(channel).arg(message)
}
