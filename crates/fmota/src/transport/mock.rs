//! Mock transport adapter for testing
//!
//! Simulates a device running the bootloader: commands are applied to an
//! in-memory flash array and answered the way the real bootloader does.
//! Faults can be injected to exercise the error paths.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Buf;
use parking_lot::Mutex;

use super::adapter::deliver;
use super::{DiscoveredDevice, NotificationSink, TransportAdapter, TransportError};
use crate::config::MockConfig;
use crate::flash::MAX_CHUNK_LEN;
use crate::protocol::{crc16_modbus, CommandKind, STATUS_OK};

/// Address reported by the mock device
pub const MOCK_ADDRESS: &str = "00:11:22:33:44:55";

/// Status the mock device returns for rejected commands
pub const STATUS_REJECTED: u8 = 0x61;

/// Value of erased flash
const ERASED: u8 = 0xFF;

/// Faults the simulated device can be told to exhibit
#[derive(Debug, Clone, Default)]
pub struct MockFaults {
    /// Never answer any command
    pub silent: bool,
    /// Report a wrong CRC on verify
    pub corrupt_crc: bool,
    /// Status to return for erase instead of success
    pub erase_status: Option<u8>,
    /// Chunk address and status to return for that write
    pub write_status_at: Option<(u32, u8)>,
    /// Status to return for verify instead of success
    pub verify_status: Option<u8>,
    /// Raw bytes to return for verify instead of the computed reply
    pub verify_reply: Option<Vec<u8>>,
    /// Never answer this command when it targets this address
    pub silent_at: Option<(CommandKind, u32)>,
}

/// Simulated bootloader state
struct MockDevice {
    flash: Vec<u8>,
    version: Vec<u8>,
    faults: MockFaults,
}

impl MockDevice {
    fn range(&self, address: u32, len: usize) -> Option<Range<usize>> {
        let start = address as usize;
        let end = start.checked_add(len)?;
        (end <= self.flash.len()).then_some(start..end)
    }

    fn handle(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        if self.faults.silent {
            return None;
        }

        let Some(kind) = CommandKind::from_frame(frame) else {
            return Some(vec![STATUS_REJECTED]);
        };
        let mut body = &frame[2..];

        if let Some((silent_kind, silent_address)) = self.faults.silent_at {
            let address = body.get(..4).map(|mut field| field.get_u32_le());
            if silent_kind == kind && address == Some(silent_address) {
                return None;
            }
        }

        let reply = match kind {
            CommandKind::ReadVersion => self.version.clone(),
            CommandKind::Erase if body.len() == 8 => {
                let address = body.get_u32_le();
                let len = body.get_u32_le() as usize;
                if let Some(status) = self.faults.erase_status {
                    return Some(vec![status]);
                }
                match self.range(address, len) {
                    Some(range) => {
                        self.flash[range].fill(ERASED);
                        vec![STATUS_OK]
                    }
                    None => vec![STATUS_REJECTED],
                }
            }
            CommandKind::Write if body.len() > 4 && body.len() <= 4 + MAX_CHUNK_LEN => {
                let address = body.get_u32_le();
                if let Some((at, status)) = self.faults.write_status_at {
                    if at == address {
                        return Some(vec![status]);
                    }
                }
                match self.range(address, body.len()) {
                    Some(range) => {
                        self.flash[range].copy_from_slice(body);
                        vec![STATUS_OK, 0x00]
                    }
                    None => vec![STATUS_REJECTED],
                }
            }
            CommandKind::Verify if body.len() == 8 => {
                let address = body.get_u32_le();
                let len = body.get_u32_le() as usize;
                if let Some(status) = self.faults.verify_status {
                    return Some(vec![status]);
                }
                if let Some(reply) = &self.faults.verify_reply {
                    return Some(reply.clone());
                }
                match self.range(address, len) {
                    Some(range) => {
                        let mut crc = crc16_modbus(&self.flash[range]);
                        if self.faults.corrupt_crc {
                            crc ^= 0x5A5A;
                        }
                        let mut reply = vec![STATUS_OK];
                        reply.extend_from_slice(&crc.to_le_bytes());
                        reply
                    }
                    None => vec![STATUS_REJECTED],
                }
            }
            CommandKind::ReadConfig if body.len() == 5 => {
                let address = body.get_u32_le();
                let len = body.get_u8() as usize;
                match self.range(address, len) {
                    Some(range) => {
                        let mut reply = vec![STATUS_OK];
                        reply.extend_from_slice(&self.flash[range]);
                        reply
                    }
                    None => vec![STATUS_REJECTED],
                }
            }
            CommandKind::Reboot if body.is_empty() => vec![STATUS_OK],
            CommandKind::RebootToMode if body.len() == 1 => vec![STATUS_OK],
            _ => vec![STATUS_REJECTED],
        };

        Some(reply)
    }
}

/// Mock transport adapter for testing
pub struct MockTransportAdapter {
    config: MockConfig,
    connected: AtomicBool,
    device: Mutex<MockDevice>,
    sink: Mutex<Option<NotificationSink>>,
    /// Every frame written, in order
    sent: Mutex<Vec<Vec<u8>>>,
}

impl MockTransportAdapter {
    pub fn new(config: &MockConfig) -> Self {
        let device = MockDevice {
            flash: vec![ERASED; config.flash_size as usize],
            version: config.version.clone().into_bytes(),
            faults: MockFaults::default(),
        };
        Self {
            config: config.clone(),
            connected: AtomicBool::new(true),
            device: Mutex::new(device),
            sink: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Replace the injected faults
    pub fn set_faults(&self, faults: MockFaults) {
        self.device.lock().faults = faults;
    }

    /// Inject a notification (simulates a late or unsolicited message)
    pub fn inject_incoming(&self, data: Vec<u8>) {
        if let Some(sink) = self.sink.lock().as_ref() {
            deliver(sink, data);
        }
    }

    /// Set connection state
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_subscribed(&self) -> bool {
        self.sink.lock().is_some()
    }

    /// Frames written so far
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Copy of the simulated flash contents
    pub fn flash(&self, address: u32, len: usize) -> Vec<u8> {
        let device = self.device.lock();
        device
            .range(address, len)
            .map(|range| device.flash[range].to_vec())
            .unwrap_or_default()
    }

    /// Scan result advertised by the simulated device
    pub fn discovered(config: &MockConfig) -> DiscoveredDevice {
        DiscoveredDevice {
            address: MOCK_ADDRESS.to_string(),
            name: Some(config.name.clone()),
            rssi: Some(-42),
        }
    }
}

#[async_trait]
impl TransportAdapter for MockTransportAdapter {
    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.sent.lock().push(data.to_vec());

        // Simulate latency
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        let reply = self.device.lock().handle(data);
        match reply {
            Some(reply) => {
                if let Some(sink) = self.sink.lock().as_ref() {
                    deliver(sink, reply);
                }
            }
            None => tracing::debug!(request = %hex::encode(data), "Mock transport: no reply"),
        }
        Ok(())
    }

    async fn subscribe(&self, sink: NotificationSink) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        self.sink.lock().take();
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.sink.lock().take();
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn address(&self) -> String {
        MOCK_ADDRESS.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> MockDevice {
        MockDevice {
            flash: vec![ERASED; 0x1000],
            version: b"v1".to_vec(),
            faults: MockFaults::default(),
        }
    }

    #[test]
    fn test_write_then_verify() {
        let mut dev = device();
        assert_eq!(
            dev.handle(&[0x0B, 0x20, 0x10, 0x00, 0x00, 0x00, 0x31, 0x32, 0x33]),
            Some(vec![STATUS_OK, 0x00])
        );

        let reply = dev
            .handle(&[0x0B, 0x10, 0x10, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00])
            .unwrap();
        let expected = crc16_modbus(b"123").to_le_bytes();
        assert_eq!(reply, vec![STATUS_OK, expected[0], expected[1]]);
    }

    #[test]
    fn test_out_of_range_erase_rejected() {
        let mut dev = device();
        let reply = dev.handle(&[0x0B, 0x2F, 0x00, 0x10, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(reply, Some(vec![STATUS_REJECTED]));
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let mut dev = device();
        assert_eq!(dev.handle(&[0x7F, 0x7F]), Some(vec![STATUS_REJECTED]));
    }

    #[test]
    fn test_silent_at_single_address() {
        let mut dev = device();
        dev.faults.silent_at = Some((CommandKind::Write, 0x10));

        let write_at = |address: u8| [0x0B, 0x20, address, 0x00, 0x00, 0x00, 0xAA];
        assert_eq!(dev.handle(&write_at(0x10)), None);
        assert_eq!(dev.handle(&write_at(0x20)), Some(vec![STATUS_OK, 0x00]));
        // Same address, other command
        assert!(dev
            .handle(&[0x0B, 0x10, 0x10, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00])
            .is_some());
    }

    #[test]
    fn test_silent_device() {
        let mut dev = device();
        dev.faults.silent = true;
        assert_eq!(dev.handle(&[0x01, 0x01]), None);
    }

    #[tokio::test]
    async fn test_write_without_subscriber_is_accepted() {
        let mock = MockTransportAdapter::new(&MockConfig::default());
        mock.write(&[0x01, 0x01]).await.unwrap();
        assert_eq!(mock.sent_frames(), vec![vec![0x01, 0x01]]);
    }
}
