//! Bluetooth LE transport through BlueZ (Linux only)

mod adapter;
mod scanner;

pub use adapter::BlueZAdapter;
pub use scanner::scan;

use bluer::{Adapter, Session};

use crate::config::BleConfig;
use crate::transport::TransportError;

/// Open the configured (or default) adapter and power it on
async fn open_adapter(session: &Session, config: &BleConfig) -> Result<Adapter, TransportError> {
    let adapter = match &config.adapter {
        Some(name) => session.adapter(name),
        None => session.default_adapter().await,
    }
    .map_err(|e| TransportError::ConnectionFailed(format!("Bluetooth adapter: {}", e)))?;

    adapter
        .set_powered(true)
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("Failed to power on adapter: {}", e)))?;

    tracing::debug!(adapter = %adapter.name(), "Bluetooth adapter ready");
    Ok(adapter)
}
