//! Link-level errors

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Link dropped or already released
    #[error("Link closed")]
    ConnectionClosed,

    #[error("Characteristic write failed: {0}")]
    SendFailed(String),

    #[error("Notification subscription failed: {0}")]
    Subscribe(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid transport settings: {0}")]
    InvalidConfig(String),

    /// Transport not compiled in or not available on this platform
    #[error("Transport unavailable: {0}")]
    Unsupported(String),

    #[error("No device with address {0} found")]
    DeviceNotFound(String),
}
