//! BlueZ GATT adapter for the bootloader characteristics

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Address, Device, Session};
use futures::{pin_mut, StreamExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::open_adapter;
use crate::config::BleConfig;
use crate::transport::adapter::deliver;
use crate::transport::{NotificationSink, TransportAdapter, TransportError};

/// Connected GATT client for one device
pub struct BlueZAdapter {
    // Keeps the D-Bus connection alive for the lifetime of the adapter
    _session: Session,
    device: Device,
    address: Address,
    write_char: Characteristic,
    notify_char: Characteristic,
    connected: AtomicBool,
    listener_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BlueZAdapter {
    /// Find the device, connect and resolve both characteristics
    pub async fn connect(config: &BleConfig, address: &str) -> Result<Self, TransportError> {
        let address: Address = address.parse().map_err(|e| {
            TransportError::InvalidConfig(format!("Invalid device address '{}': {}", address, e))
        })?;
        let timeout = config.connect_timeout();

        let session = Session::new()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("BlueZ session: {}", e)))?;
        let adapter = open_adapter(&session, config).await?;

        let device = find_device(&adapter, address, timeout).await?;

        let connected = device
            .is_connected()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        if !connected {
            info!(%address, "Connecting");
            tokio::time::timeout(timeout, device.connect())
                .await
                .map_err(|_| TransportError::Timeout(format!("Connecting to {}", address)))?
                .map_err(|e| {
                    TransportError::ConnectionFailed(format!("Connect to {}: {}", address, e))
                })?;
        }

        wait_services_resolved(&device, timeout).await?;

        let write_uuid = bluer::Uuid::from_u128(config.write_uuid.as_u128());
        let notify_uuid = bluer::Uuid::from_u128(config.notify_uuid.as_u128());
        let mut write_char = None;
        let mut notify_char = None;

        let services = device
            .services()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("GATT services: {}", e)))?;
        for service in services {
            let characteristics = service.characteristics().await.map_err(|e| {
                TransportError::ConnectionFailed(format!("GATT characteristics: {}", e))
            })?;
            for characteristic in characteristics {
                let uuid = characteristic
                    .uuid()
                    .await
                    .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
                if uuid == write_uuid {
                    write_char = Some(characteristic);
                } else if uuid == notify_uuid {
                    notify_char = Some(characteristic);
                }
            }
        }

        let write_char = write_char.ok_or_else(|| {
            TransportError::ConnectionFailed(format!("Characteristic {} not found", write_uuid))
        })?;
        let notify_char = notify_char.ok_or_else(|| {
            TransportError::ConnectionFailed(format!("Characteristic {} not found", notify_uuid))
        })?;

        info!(%address, "Connected");

        Ok(Self {
            _session: session,
            device,
            address,
            write_char,
            notify_char,
            connected: AtomicBool::new(true),
            listener_handle: Mutex::new(None),
        })
    }

    fn stop_listener(&self) {
        if let Some(handle) = self.listener_handle.lock().take() {
            handle.abort();
            debug!("Notification listener stopped");
        }
    }
}

/// Look the device up in the adapter cache, discovering it if needed
async fn find_device(
    adapter: &Adapter,
    address: Address,
    timeout: Duration,
) -> Result<Device, TransportError> {
    let known = adapter
        .device_addresses()
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
    if known.contains(&address) {
        return adapter
            .device(address)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()));
    }

    debug!(%address, "Device not cached, discovering");
    let events = adapter
        .discover_devices()
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("Discovery: {}", e)))?;
    pin_mut!(events);

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, events.next()).await {
            Ok(Some(AdapterEvent::DeviceAdded(found))) if found == address => {
                return adapter
                    .device(found)
                    .map_err(|e| TransportError::ConnectionFailed(e.to_string()));
            }
            Ok(Some(_)) => continue,
            _ => break,
        }
    }

    Err(TransportError::DeviceNotFound(address.to_string()))
}

async fn wait_services_resolved(device: &Device, timeout: Duration) -> Result<(), TransportError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let resolved = device
            .is_services_resolved()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        if resolved {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(TransportError::Timeout("GATT service resolution".to_string()));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[async_trait]
impl TransportAdapter for BlueZAdapter {
    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.write_char
            .write(data)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn subscribe(&self, sink: NotificationSink) -> Result<(), TransportError> {
        self.stop_listener();

        let mut reader = self
            .notify_char
            .notify_io()
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let handle = tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Ok(data) => {
                        tracing::trace!(data = %hex::encode(&data), "Notification");
                        deliver(&sink, data);
                    }
                    Err(e) => {
                        debug!(error = %e, "Notification stream ended");
                        break;
                    }
                }
            }
        });

        *self.listener_handle.lock() = Some(handle);
        debug!(address = %self.address, "Notification listener started");
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        self.stop_listener();
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.device.is_connected().await.unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.stop_listener();
        self.connected.store(false, Ordering::SeqCst);
        self.device
            .disconnect()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("Disconnect: {}", e)))?;
        info!(address = %self.address, "Disconnected");
        Ok(())
    }

    fn address(&self) -> String {
        self.address.to_string()
    }
}

impl Drop for BlueZAdapter {
    fn drop(&mut self) {
        if let Some(handle) = self.listener_handle.get_mut().take() {
            handle.abort();
        }
    }
}
