//! Update engine configuration
//!
//! This module contains configuration types for the transport, the command
//! channel, the flash writer and the device memory map. Every section has
//! defaults matching the stock bootloader, so an empty TOML document is a
//! valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OtaError;
use crate::flash::MAX_CHUNK_LEN;
use crate::update::MemoryMap;

/// Command characteristic (host -> device)
pub const WRITE_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64d3fff1_d166_11ea_87d0_0242ac130003);

/// Notify characteristic (device -> host)
pub const NOTIFY_CHARACTERISTIC: Uuid = Uuid::from_u128(0x64d3fff2_d166_11ea_87d0_0242ac130003);

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OtaConfig {
    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
    /// Command/response channel settings
    #[serde(default)]
    pub channel: ChannelConfig,
    /// Flash writer settings
    #[serde(default)]
    pub flash: FlashConfig,
    /// Device memory map
    #[serde(default)]
    pub memory_map: MemoryMap,
}

impl OtaConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, OtaError> {
        let config: Self =
            toml::from_str(content).map_err(|e| OtaError::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), OtaError> {
        if self.flash.chunk_len == 0 || self.flash.chunk_len > MAX_CHUNK_LEN {
            return Err(OtaError::Config(format!(
                "flash.chunk_len must be within 1..={}, got {}",
                MAX_CHUNK_LEN, self.flash.chunk_len
            )));
        }
        if self.channel.timeout_ms == 0 {
            return Err(OtaError::Config(
                "channel.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.channel.queue_depth == 0 {
            return Err(OtaError::Config(
                "channel.queue_depth must be greater than zero".to_string(),
            ));
        }
        self.memory_map.validate()
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Bluetooth LE through BlueZ (Linux only)
    Ble(BleConfig),
    /// Simulated device for testing
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Ble(BleConfig::default())
    }
}

/// Bluetooth LE configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BleConfig {
    /// Adapter name (e.g., "hci0"); the default adapter when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    /// Characteristic commands are written to
    #[serde(default = "default_write_uuid")]
    pub write_uuid: Uuid,
    /// Characteristic responses are notified on
    #[serde(default = "default_notify_uuid")]
    pub notify_uuid: Uuid,
    /// Upper bound for discovery, connection and service resolution
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            write_uuid: WRITE_CHARACTERISTIC,
            notify_uuid: NOTIFY_CHARACTERISTIC,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl BleConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_write_uuid() -> Uuid {
    WRITE_CHARACTERISTIC
}

fn default_notify_uuid() -> Uuid {
    NOTIFY_CHARACTERISTIC
}

fn default_connect_timeout_ms() -> u64 {
    20000
}

/// Simulated device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated response latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Size of the simulated flash in bytes
    #[serde(default = "default_flash_size")]
    pub flash_size: u32,
    /// Reply to the read-version command
    #[serde(default = "default_mock_version")]
    pub version: String,
    /// Name advertised during scans
    #[serde(default = "default_mock_name")]
    pub name: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            flash_size: default_flash_size(),
            version: default_mock_version(),
            name: default_mock_name(),
        }
    }
}

fn default_flash_size() -> u32 {
    0x80000
}

fn default_mock_version() -> String {
    "BL-1.0.0".to_string()
}

fn default_mock_name() -> String {
    "FM-BL mock".to_string()
}

// =============================================================================
// Channel / Flash Configuration
// =============================================================================

/// Command/response channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// How long to wait for a response to each command
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Capacity of the inbound notification queue
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Fail a command instead of warning when unsolicited notifications are
    /// found queued before it is sent
    #[serde(default)]
    pub strict_sync: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            queue_depth: default_queue_depth(),
            strict_sync: false,
        }
    }
}

impl ChannelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_queue_depth() -> usize {
    16
}

/// Flash writer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Bytes per write command (at most 128)
    #[serde(default = "default_chunk_len")]
    pub chunk_len: usize,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            chunk_len: default_chunk_len(),
        }
    }
}

fn default_chunk_len() -> usize {
    MAX_CHUNK_LEN
}
