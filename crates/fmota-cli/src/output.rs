//! Output formatting for fmota (table, json)

use clap::ValueEnum;
use colored::Colorize;
use fmota::update::WrittenRegion;
use fmota::DiscoveredDevice;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Human-readable messages are suppressed in quiet and json modes
    fn chatty(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Table
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if self.chatty() {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if self.chatty() {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print rows in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    println!("{}", Table::new(data));
                }
            }
            OutputFormat::Json => self.print_json(&data),
        }
    }

    /// Print key-value pairs (table mode only)
    pub fn print_kv(&self, pairs: &[(&str, String)]) {
        if self.format != OutputFormat::Table {
            return;
        }
        for (key, value) in pairs {
            println!("{}: {}", key.bold(), value);
        }
    }

    /// Print any serializable value as pretty JSON
    pub fn print_json<T: Serialize + ?Sized>(&self, data: &T) {
        println!(
            "{}",
            serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
        );
    }
}

/// Scan result row
#[derive(Tabled, Serialize)]
pub struct DeviceRow {
    #[tabled(rename = "Address")]
    pub address: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "RSSI")]
    pub rssi: String,
}

impl From<&DiscoveredDevice> for DeviceRow {
    fn from(device: &DiscoveredDevice) -> Self {
        Self {
            address: device.address.clone(),
            name: device.name.clone().unwrap_or_else(|| "-".to_string()),
            rssi: device
                .rssi
                .map(|rssi| format!("{} dBm", rssi))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Written region row
#[derive(Tabled, Serialize)]
pub struct RegionRow {
    #[tabled(rename = "Slot")]
    pub slot: String,
    #[tabled(rename = "Address")]
    pub address: String,
    #[tabled(rename = "Length")]
    pub length: u32,
    #[tabled(rename = "Chunks")]
    pub chunks: usize,
    #[tabled(rename = "CRC16")]
    pub crc: String,
}

impl From<&WrittenRegion> for RegionRow {
    fn from(written: &WrittenRegion) -> Self {
        Self {
            slot: written.slot.to_string(),
            address: format!("0x{:08X}", written.region.address),
            length: written.region.length,
            chunks: written.region.chunks,
            crc: format!("0x{:04X}", written.region.crc),
        }
    }
}
