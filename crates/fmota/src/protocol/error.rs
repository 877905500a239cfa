//! Command/response errors

use std::time::Duration;

use thiserror::Error;

use super::CommandKind;
use crate::transport::TransportError;

#[derive(Debug, Error, Clone)]
pub enum CommandError {
    /// No notification arrived within the channel timeout
    #[error("No response to {command} within {timeout:?}")]
    Timeout {
        command: CommandKind,
        timeout: Duration,
    },

    /// Status byte was not the success code
    #[error("{command} failed with status 0x{status:02X}")]
    Status { command: CommandKind, status: u8 },

    /// Response shape did not match the command
    #[error("Malformed {command} response: [{response}]")]
    Malformed {
        command: CommandKind,
        response: String,
    },

    /// Notifications arrived while no command was outstanding
    #[error("Protocol desync: {count} unsolicited notification(s) queued before {command}")]
    Desync { command: CommandKind, count: usize },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
