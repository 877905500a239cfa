//! Update session errors

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::flash::FlashError;
use crate::protocol::CommandError;
use crate::transport::TransportError;
use crate::update::Slot;

/// Result type alias for update operations
pub type Result<T> = std::result::Result<T, OtaError>;

/// Region a flash failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashTarget {
    Image(Slot),
    ConfigRecord,
}

impl fmt::Display for FlashTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashTarget::Image(slot) => write!(f, "{} image", slot),
            FlashTarget::ConfigRecord => f.write_str("configuration record"),
        }
    }
}

/// Errors that end an update session
#[derive(Debug, Error)]
pub enum OtaError {
    /// Link could not be opened or was lost
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A non-flash command failed
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Erase/program/verify of a region failed
    #[error("Failed to write {target}: {source}")]
    Flash {
        target: FlashTarget,
        #[source]
        source: FlashError,
    },

    /// Image does not fit the memory map
    #[error("Image error: {0}")]
    Image(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Image file could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OtaError {
    /// Whether the session ended because the device stopped answering
    pub fn is_timeout(&self) -> bool {
        match self {
            OtaError::Command(CommandError::Timeout { .. }) => true,
            OtaError::Flash { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}
