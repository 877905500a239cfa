//! Transport adapter trait and types

use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::TransportError;

/// Notification received from the device's notify characteristic
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Timestamp when the notification was received
    pub timestamp: Instant,
    /// Raw payload, one complete protocol message
    pub data: Vec<u8>,
}

impl IncomingMessage {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            timestamp: Instant::now(),
            data,
        }
    }
}

/// Sending half of the inbound notification queue
pub type NotificationSink = mpsc::Sender<IncomingMessage>;

/// Duplex link to a single device
///
/// The link carries one outbound characteristic (commands) and one inbound
/// characteristic (notifications). Connection lifecycle belongs to the
/// caller; the protocol engine only writes, subscribes and disconnects.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Write raw bytes to the outbound characteristic
    async fn write(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Start delivering inbound notifications into `sink`
    ///
    /// Every notification is pushed as one `IncomingMessage`. Only one sink
    /// may be active at a time; subscribing again replaces the previous one.
    async fn subscribe(&self, sink: NotificationSink) -> Result<(), TransportError>;

    /// Stop delivering notifications
    async fn unsubscribe(&self) -> Result<(), TransportError>;

    /// Check if the link is still up
    async fn is_connected(&self) -> bool;

    /// Release the link
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Address of the connected device
    fn address(&self) -> String;
}

/// Push a notification into a sink without blocking the producer
///
/// The queue is bounded; when it is full the notification is dropped and a
/// warning is logged.
pub(crate) fn deliver(sink: &NotificationSink, data: Vec<u8>) {
    match sink.try_send(IncomingMessage::new(data)) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(msg)) => {
            tracing::warn!(
                data = %hex::encode(&msg.data),
                "Notification queue full, dropping notification"
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!("Notification queue closed, dropping notification");
        }
    }
}

/// Device seen during a scan
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DiscoveredDevice {
    /// Link-layer address (e.g., "F7:D8:78:CF:93:5B")
    pub address: String,
    /// Advertised name
    pub name: Option<String>,
    /// Signal strength in dBm
    pub rssi: Option<i16>,
}
