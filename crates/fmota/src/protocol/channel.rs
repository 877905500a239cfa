//! Synchronous request/response over the duplex transport

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{Command, CommandError, CommandKind, Response};
use crate::config::ChannelConfig;
use crate::transport::{IncomingMessage, TransportAdapter, TransportError};

/// One-command-at-a-time channel to the device
///
/// The channel owns the inbound notification queue; the transport's
/// notification handler is the producer and [`send_command`] the only
/// consumer. `send_command` takes `&mut self`, so a second command cannot be
/// issued while one is outstanding.
///
/// Notifications found in the queue before a command is written (late
/// replies to a command that already timed out, or unsolicited messages) are
/// logged and discarded. They never satisfy a later command.
///
/// [`send_command`]: CommandChannel::send_command
pub struct CommandChannel {
    transport: Arc<dyn TransportAdapter>,
    inbound: mpsc::Receiver<IncomingMessage>,
    timeout: Duration,
    strict_sync: bool,
    unsolicited: usize,
}

impl CommandChannel {
    /// Create the notification queue and subscribe the transport to it
    pub async fn open(
        transport: Arc<dyn TransportAdapter>,
        config: &ChannelConfig,
    ) -> Result<Self, TransportError> {
        let (sink, inbound) = mpsc::channel(config.queue_depth.max(1));
        transport.subscribe(sink).await?;
        debug!(
            address = %transport.address(),
            timeout_ms = config.timeout_ms,
            "Notifications subscribed"
        );

        Ok(Self {
            transport,
            inbound,
            timeout: config.timeout(),
            strict_sync: config.strict_sync,
            unsolicited: 0,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of unsolicited notifications discarded so far
    pub fn unsolicited(&self) -> usize {
        self.unsolicited
    }

    /// Write one command and wait for the next notification
    ///
    /// The notification is returned verbatim; status checking is left to the
    /// caller. A missing reply yields [`CommandError::Timeout`] and is never
    /// retried.
    pub async fn send_command(&mut self, command: &Command) -> Result<Response, CommandError> {
        let kind = command.kind();

        let stale = self.discard_stale(kind);
        if stale > 0 && self.strict_sync {
            return Err(CommandError::Desync {
                command: kind,
                count: stale,
            });
        }

        let frame = command.encode();
        trace!(command = %kind, frame = %hex::encode(&frame), "Sending command");
        self.transport.write(&frame).await?;

        match tokio::time::timeout(self.timeout, self.inbound.recv()).await {
            Ok(Some(msg)) => {
                debug!(
                    command = %kind,
                    response = %hex::encode(&msg.data),
                    "Response received"
                );
                Ok(Response::new(kind, msg.data))
            }
            Ok(None) => Err(TransportError::ConnectionClosed.into()),
            Err(_) => {
                warn!(
                    command = %kind,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Command timed out"
                );
                Err(CommandError::Timeout {
                    command: kind,
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Unsubscribe and report anything still queued
    ///
    /// Returns the total number of unsolicited notifications seen on this
    /// channel.
    pub async fn close(mut self) -> usize {
        while let Ok(msg) = self.inbound.try_recv() {
            self.unsolicited += 1;
            warn!(
                data = %hex::encode(&msg.data),
                "Unsolicited notification after last command"
            );
        }
        if let Err(e) = self.transport.unsubscribe().await {
            warn!(error = %e, "Failed to unsubscribe notifications");
        }
        self.inbound.close();
        self.unsolicited
    }

    fn discard_stale(&mut self, next: CommandKind) -> usize {
        let mut count = 0;
        while let Ok(msg) = self.inbound.try_recv() {
            count += 1;
            warn!(
                data = %hex::encode(&msg.data),
                age_ms = msg.timestamp.elapsed().as_millis() as u64,
                next_command = %next,
                "Discarding unsolicited notification"
            );
        }
        self.unsolicited += count;
        count
    }
}
