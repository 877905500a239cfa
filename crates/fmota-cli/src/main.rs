//! fmota - over-the-air firmware updates for BLE bootloaders
//!
//! Scans for devices, connects to one and runs an update session.

mod commands;
mod config;
mod images;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::Colorize;
use fmota::{RebootRequest, UpdatePlan};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::images::ImageSources;
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "fmota")]
#[command(author, version, about = "Over-the-air firmware updates over BLE")]
struct Cli {
    /// Scan for devices and list them
    #[arg(long)]
    scan: bool,

    /// Device address to update
    #[arg(long, value_name = "ADDR", conflicts_with = "auto")]
    mac: Option<String>,

    /// Scan and update the first device whose name or address contains NAME
    #[arg(long, value_name = "NAME")]
    auto: Option<String>,

    /// Bootloader image
    #[arg(long, value_name = "PATH")]
    bl: Option<PathBuf>,

    /// Soft-device image
    #[arg(long, value_name = "PATH")]
    sd: Option<PathBuf>,

    /// Application image
    #[arg(long, value_name = "PATH")]
    app: Option<PathBuf>,

    /// Pick images from DIR whose file names contain "bl", "sd" or "app"
    #[arg(long, value_name = "DIR")]
    image_dir: Option<PathBuf>,

    /// Read the configuration record back after writing
    #[arg(long)]
    read_conf: bool,

    /// Reboot into MODE when done (decimal or 0x-prefixed hex)
    #[arg(long, value_name = "MODE", value_parser = parse_mode)]
    reboot_to: Option<u8>,

    /// Reboot when done
    #[arg(long)]
    reboot: bool,

    /// Scan duration in seconds
    #[arg(long, default_value_t = 5)]
    scan_secs: u64,

    /// Configuration file path
    #[arg(short, long, env = "FMOTA_CONFIG")]
    config: Option<PathBuf>,

    /// Talk to a simulated device instead of BLE
    #[arg(long)]
    mock: bool,

    /// Output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", format!("Error: {:#}", e).red());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if !cli.scan && cli.mac.is_none() && cli.auto.is_none() {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    }

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(cli.output, cli.no_color, cli.mock)?;
    let ctx = OutputContext::new(merged.output, merged.no_color, cli.quiet);
    let scan_duration = Duration::from_secs(cli.scan_secs);

    let scanned = if cli.scan {
        Some(commands::scan(&merged.ota.transport, scan_duration, &ctx).await?)
    } else {
        None
    };

    let address = match (&cli.mac, &cli.auto) {
        (Some(mac), _) => mac.clone(),
        (None, Some(pattern)) => {
            commands::select(
                &merged.ota.transport,
                pattern,
                scan_duration,
                scanned.as_deref(),
                &ctx,
            )
            .await?
        }
        (None, None) => return Ok(()),
    };

    let sources = ImageSources::resolve(
        cli.bl.as_deref(),
        cli.sd.as_deref(),
        cli.app.as_deref(),
        cli.image_dir.as_deref(),
    )?;
    if sources.is_empty() {
        ctx.info("No images given; querying the device only");
    }
    let mut plan = UpdatePlan::new()
        .with_read_config(cli.read_conf)
        .with_reboot(RebootRequest::from_flags(cli.reboot, cli.reboot_to));
    for image in sources
        .load(&merged.ota.memory_map)
        .await
        .context("Failed to load images")?
    {
        plan = plan.with_image(image);
    }

    commands::update(&merged.ota, &address, &plan, &ctx).await
}

/// Parse a boot mode given as decimal or 0x-prefixed hex
fn parse_mode(s: &str) -> std::result::Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid mode '{}': {}", s, e))
}
