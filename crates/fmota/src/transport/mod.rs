//! Transport layer for the bootloader link
//!
//! This module provides transport adapters for talking to the device:
//! - BlueZ adapter for Bluetooth LE (Linux only, `bluez` feature)
//! - Mock adapter simulating the device for testing
//!
//! # Example
//!
//! ```ignore
//! use fmota::transport::create_transport;
//! use fmota::config::TransportConfig;
//!
//! let config = TransportConfig::Mock(Default::default());
//! let transport = create_transport(&config, "F7:D8:78:CF:93:5B").await?;
//! transport.write(&[0x01, 0x01]).await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;

#[cfg(all(target_os = "linux", feature = "bluez"))]
pub mod bluez;

pub use adapter::{DiscoveredDevice, IncomingMessage, NotificationSink, TransportAdapter};
pub use error::TransportError;

use std::sync::Arc;
use std::time::Duration;

use crate::config::TransportConfig;

/// Connect to the device at `address`
pub async fn create_transport(
    config: &TransportConfig,
    address: &str,
) -> Result<Arc<dyn TransportAdapter>, TransportError> {
    match config {
        #[cfg(all(target_os = "linux", feature = "bluez"))]
        TransportConfig::Ble(cfg) => {
            let adapter = bluez::BlueZAdapter::connect(cfg, address).await?;
            Ok(Arc::new(adapter))
        }
        #[cfg(not(all(target_os = "linux", feature = "bluez")))]
        TransportConfig::Ble(_) => Err(TransportError::Unsupported(format!(
            "BLE connection to {} requires Linux and the 'bluez' feature",
            address
        ))),
        TransportConfig::Mock(cfg) => {
            tracing::debug!(address, "Using mock transport");
            let adapter = mock::MockTransportAdapter::new(cfg);
            Ok(Arc::new(adapter))
        }
    }
}

/// List devices reachable within `duration`
pub async fn scan(
    config: &TransportConfig,
    duration: Duration,
) -> Result<Vec<DiscoveredDevice>, TransportError> {
    match config {
        #[cfg(all(target_os = "linux", feature = "bluez"))]
        TransportConfig::Ble(cfg) => bluez::scan(cfg, duration).await,
        #[cfg(not(all(target_os = "linux", feature = "bluez")))]
        TransportConfig::Ble(_) => {
            let _ = duration;
            Err(TransportError::Unsupported(
                "BLE scanning requires Linux and the 'bluez' feature".to_string(),
            ))
        }
        TransportConfig::Mock(cfg) => Ok(vec![mock::MockTransportAdapter::discovered(cfg)]),
    }
}
