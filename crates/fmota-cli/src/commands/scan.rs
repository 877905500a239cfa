//! Scan command - list nearby devices

use std::time::Duration;

use anyhow::{Context, Result};
use fmota::{select_target, DiscoveredDevice, TransportConfig};

use crate::output::{DeviceRow, OutputContext};

/// Scan and print the devices found
pub async fn scan(
    transport: &TransportConfig,
    duration: Duration,
    ctx: &OutputContext,
) -> Result<Vec<DiscoveredDevice>> {
    ctx.info(&format!("Scanning for {}s...", duration.as_secs()));
    let devices = fmota::scan(transport, duration)
        .await
        .context("Scan failed")?;

    let rows: Vec<DeviceRow> = devices.iter().map(DeviceRow::from).collect();
    ctx.print(&rows);
    Ok(devices)
}

/// Pick the device to update by name or address fragment
///
/// Reuses `scanned` when a scan already ran in this invocation.
pub async fn select(
    transport: &TransportConfig,
    pattern: &str,
    duration: Duration,
    scanned: Option<&[DiscoveredDevice]>,
    ctx: &OutputContext,
) -> Result<String> {
    let fresh;
    let devices = match scanned {
        Some(devices) => devices,
        None => {
            ctx.info(&format!(
                "Scanning {}s for a device matching '{}'...",
                duration.as_secs(),
                pattern
            ));
            fresh = fmota::scan(transport, duration)
                .await
                .context("Scan failed")?;
            fresh.as_slice()
        }
    };

    let device = select_target(devices, pattern)
        .with_context(|| format!("No device matching '{}' found", pattern))?;

    ctx.info(&format!(
        "Selected {} ({})",
        device.address,
        device.name.as_deref().unwrap_or("unnamed")
    ));
    Ok(device.address.clone())
}
