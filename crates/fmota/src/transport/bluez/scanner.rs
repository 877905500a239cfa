//! BLE device discovery

use std::time::Duration;

use bluer::{AdapterEvent, Session};
use futures::{pin_mut, StreamExt};
use tracing::{debug, info};

use super::open_adapter;
use crate::config::BleConfig;
use crate::transport::{DiscoveredDevice, TransportError};

/// Collect advertising devices for `duration`
pub async fn scan(
    config: &BleConfig,
    duration: Duration,
) -> Result<Vec<DiscoveredDevice>, TransportError> {
    let session = Session::new()
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("BlueZ session: {}", e)))?;
    let adapter = open_adapter(&session, config).await?;

    let events = adapter
        .discover_devices()
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("Discovery: {}", e)))?;
    pin_mut!(events);

    info!(duration_ms = duration.as_millis() as u64, "Scanning");

    let mut devices: Vec<DiscoveredDevice> = Vec::new();
    let deadline = tokio::time::Instant::now() + duration;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, events.next()).await {
            Ok(Some(AdapterEvent::DeviceAdded(addr))) => {
                let address = addr.to_string();
                if devices.iter().any(|d| d.address == address) {
                    continue;
                }
                let device = adapter
                    .device(addr)
                    .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
                let name = device.name().await.unwrap_or(None);
                let rssi = device.rssi().await.unwrap_or(None);
                debug!(%address, ?name, ?rssi, "Device found");
                devices.push(DiscoveredDevice {
                    address,
                    name,
                    rssi,
                });
            }
            Ok(Some(_)) => continue,
            _ => break,
        }
    }

    info!(count = devices.len(), "Scan complete");
    Ok(devices)
}
