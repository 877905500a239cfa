//! Update command - run a session against one device

use anyhow::{Context, Result};
use fmota::{create_transport, run_session, FlashProgress, OtaConfig, Slot, UpdatePlan, UpdateReport};
use indicatif::{ProgressBar, ProgressStyle};

use crate::output::{OutputContext, OutputFormat, RegionRow};

/// One progress bar per image, created when its first chunk lands
struct ImageBars {
    hidden: bool,
    current: Option<(Slot, ProgressBar)>,
}

impl ImageBars {
    fn new(hidden: bool) -> Self {
        Self {
            hidden,
            current: None,
        }
    }

    fn update(&mut self, slot: Slot, progress: FlashProgress) {
        let switch = !matches!(&self.current, Some((current, _)) if *current == slot);
        if switch {
            self.finish("done");
            self.current = Some((slot, self.bar(slot, progress.total)));
        }
        if let Some((_, pb)) = &self.current {
            pb.set_position(progress.written as u64);
            pb.set_message(format!("{:.0}%", progress.percent()));
        }
    }

    fn bar(&self, slot: Slot, total: usize) -> ProgressBar {
        if self.hidden {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{prefix:>12.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
        pb.set_style(style);
        pb.set_prefix(slot.to_string());
        pb
    }

    fn finish(&mut self, msg: &'static str) {
        if let Some((_, pb)) = self.current.take() {
            pb.finish_with_message(msg);
        }
    }
}

/// Connect to `address` and run the plan
pub async fn update(
    config: &OtaConfig,
    address: &str,
    plan: &UpdatePlan,
    ctx: &OutputContext,
) -> Result<()> {
    if let Some(app) = plan.ignored_application() {
        ctx.warn(&format!(
            "Application image ({} bytes) ignored: soft-device/bootloader update takes precedence",
            app.len()
        ));
    }

    ctx.info(&format!("Connecting to {}...", address));
    let transport = create_transport(&config.transport, address)
        .await
        .with_context(|| format!("Failed to connect to {}", address))?;

    let mut bars = ImageBars::new(ctx.quiet || ctx.format != OutputFormat::Table);
    let mut on_progress = |slot: Slot, progress: FlashProgress| bars.update(slot, progress);

    let result = run_session(transport, config, plan, Some(&mut on_progress)).await;
    bars.finish(if result.is_ok() { "done" } else { "failed" });

    let report = result.with_context(|| format!("Update of {} failed", address))?;
    print_report(&report, ctx);
    Ok(())
}

fn print_report(report: &UpdateReport, ctx: &OutputContext) {
    if ctx.format == OutputFormat::Json {
        ctx.print_json(report);
        return;
    }

    let mut pairs = vec![("Version", report.version_string())];
    if let Some(record) = &report.config_record {
        pairs.push((
            "Config record",
            format!(
                "bl={} sd={} app={}",
                record.bootloader_len, record.softdevice_len, record.application_len
            ),
        ));
    }
    if let Some(readout) = &report.readout {
        pairs.push(("Read-back status", format!("0x{:02X}", readout.status)));
        pairs.push(("Read-back data", hex::encode(&readout.raw)));
    }
    if let Some(status) = report.reboot_status {
        pairs.push(("Reboot status", format!("0x{:02X}", status)));
    }
    if report.unsolicited > 0 {
        pairs.push(("Unsolicited", report.unsolicited.to_string()));
    }
    if !ctx.quiet {
        ctx.print_kv(&pairs);
    }

    if !report.regions.is_empty() {
        let rows: Vec<RegionRow> = report.regions.iter().map(RegionRow::from).collect();
        ctx.print(&rows);
        ctx.success("Firmware update completed successfully");
    }
}
