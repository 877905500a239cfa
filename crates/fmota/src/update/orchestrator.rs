//! Session sequencing: version, images, config record, readback, reboot

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Image, MemoryMap, RebootRequest, Slot, UpdateMode, UpdatePlan};
use crate::config::OtaConfig;
use crate::error::{FlashTarget, OtaError};
use crate::flash::{FlashProgress, FlashWriter, RegionReport};
use crate::protocol::{
    Command, CommandChannel, CommandError, ConfigReadout, ConfigRecord, CONFIG_RECORD_LEN,
};
use crate::transport::TransportAdapter;

/// Region written during a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WrittenRegion {
    pub slot: Slot,
    #[serde(flatten)]
    pub region: RegionReport,
}

/// Outcome of a completed session
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateReport {
    /// Raw read-version response
    #[serde(serialize_with = "serialize_version")]
    pub version: Vec<u8>,
    pub regions: Vec<WrittenRegion>,
    /// Record written after the images
    pub config_record: Option<ConfigRecord>,
    pub readout: Option<ConfigReadout>,
    /// Status byte of the reboot reply; `None` if no reboot was sent or the
    /// device reset before answering
    pub reboot_status: Option<u8>,
    /// Images supplied but not written
    pub skipped: Vec<Slot>,
    /// Notifications that arrived without a pending command
    pub unsolicited: usize,
}

impl UpdateReport {
    pub fn version_string(&self) -> String {
        String::from_utf8_lossy(&self.version).into_owned()
    }
}

fn serialize_version<S: serde::Serializer>(raw: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(raw))
}

/// Drives one update session over an open channel
pub struct Updater {
    channel: CommandChannel,
    memory_map: MemoryMap,
    chunk_len: usize,
}

impl Updater {
    pub fn new(channel: CommandChannel, memory_map: MemoryMap, chunk_len: usize) -> Self {
        Self {
            channel,
            memory_map,
            chunk_len,
        }
    }

    pub fn into_channel(self) -> CommandChannel {
        self.channel
    }

    /// Query the bootloader version; the reply is returned verbatim
    pub async fn read_version(&mut self) -> Result<Vec<u8>, OtaError> {
        let response = self.channel.send_command(&Command::ReadVersion).await?;
        let version = response.into_bytes();
        info!(
            version = %String::from_utf8_lossy(&version),
            raw = %hex::encode(&version),
            "Bootloader version"
        );
        Ok(version)
    }

    /// Erase, program and verify one image at its slot address
    pub async fn write_image(
        &mut self,
        image: &Image,
        progress: Option<&mut (dyn FnMut(Slot, FlashProgress) + Send + '_)>,
    ) -> Result<RegionReport, OtaError> {
        let slot = image.slot();
        info!(
            %slot,
            address = format_args!("0x{:08X}", image.address()),
            size = image.len(),
            "Writing image"
        );

        let mut forward = progress.map(|report| move |p: FlashProgress| report(slot, p));
        let sink = forward
            .as_mut()
            .map(|f| f as &mut (dyn FnMut(FlashProgress) + Send));

        FlashWriter::new(&mut self.channel)
            .with_chunk_len(self.chunk_len)
            .write_region(image.address(), image.data(), sink)
            .await
            .map_err(|source| OtaError::Flash {
                target: FlashTarget::Image(slot),
                source,
            })
    }

    /// Write the configuration record through the same erase/program/verify
    /// sequence as an image
    pub async fn write_config_record(
        &mut self,
        record: ConfigRecord,
    ) -> Result<RegionReport, OtaError> {
        info!(
            bootloader_len = record.bootloader_len,
            softdevice_len = record.softdevice_len,
            application_len = record.application_len,
            "Writing configuration record"
        );
        let data = Bytes::copy_from_slice(&record.encode());

        FlashWriter::new(&mut self.channel)
            .with_chunk_len(self.chunk_len)
            .write_region(self.memory_map.config_record, &data, None)
            .await
            .map_err(|source| OtaError::Flash {
                target: FlashTarget::ConfigRecord,
                source,
            })
    }

    /// Read the configuration record region back
    ///
    /// The status byte is reported, not checked.
    pub async fn read_config_record(&mut self) -> Result<ConfigReadout, OtaError> {
        let command = Command::ReadConfig {
            address: self.memory_map.config_record,
            length: CONFIG_RECORD_LEN as u8,
        };
        let response = self.channel.send_command(&command).await?;
        let status = response.status().ok_or_else(|| response.malformed())?;
        let readout = ConfigReadout::from_response(status, response.payload().to_vec());

        info!(
            status = format_args!("0x{:02X}", status),
            raw = %hex::encode(&readout.raw),
            decoded = readout.record.is_some(),
            "Configuration record read back"
        );
        Ok(readout)
    }

    /// Send the requested reboot
    ///
    /// A device that resets before answering is not an error.
    pub async fn reboot(&mut self, request: RebootRequest) -> Result<Option<u8>, OtaError> {
        let command = match request {
            RebootRequest::None => return Ok(None),
            RebootRequest::Reset => Command::Reboot,
            RebootRequest::ToMode(mode) => Command::RebootToMode { mode },
        };

        match self.channel.send_command(&command).await {
            Ok(response) => {
                let status = response.status();
                info!(command = %command.kind(), status = ?status, "Reboot acknowledged");
                Ok(status)
            }
            Err(CommandError::Timeout { .. }) => {
                warn!(
                    command = %command.kind(),
                    "No reply to reboot; device may have reset already"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Run a whole plan; the first failure aborts the session
    pub async fn run(
        &mut self,
        plan: &UpdatePlan,
        mut progress: Option<&mut (dyn FnMut(Slot, FlashProgress) + Send + '_)>,
    ) -> Result<UpdateReport, OtaError> {
        let mut report = UpdateReport {
            version: self.read_version().await?,
            ..Default::default()
        };

        match plan.mode() {
            UpdateMode::System {
                softdevice,
                bootloader,
            } => {
                if let Some(app) = plan.ignored_application() {
                    warn!(
                        size = app.len(),
                        "Application image ignored: soft-device/bootloader update takes precedence"
                    );
                    report.skipped.push(Slot::Application);
                }
                for image in [softdevice, bootloader].into_iter().flatten() {
                    let region = self.write_image(image, progress.as_deref_mut()).await?;
                    report.regions.push(WrittenRegion {
                        slot: image.slot(),
                        region,
                    });
                }
                let record = ConfigRecord::system(
                    bootloader.map_or(0, Image::len),
                    softdevice.map_or(0, Image::len),
                );
                self.write_config_record(record).await?;
                report.config_record = Some(record);
            }
            UpdateMode::Application(image) => {
                let region = self.write_image(image, progress.as_deref_mut()).await?;
                report.regions.push(WrittenRegion {
                    slot: Slot::Application,
                    region,
                });
                let record = ConfigRecord::application(image.len());
                self.write_config_record(record).await?;
                report.config_record = Some(record);
            }
            UpdateMode::Idle => debug!("No images to write"),
        }

        if plan.read_config {
            report.readout = Some(self.read_config_record().await?);
        }

        report.reboot_status = self.reboot(plan.reboot).await?;
        report.unsolicited = self.channel.unsolicited();
        Ok(report)
    }
}

/// Run a plan over a connected transport
///
/// The channel is closed and the transport disconnected whether or not the
/// session succeeds.
pub async fn run_session(
    transport: Arc<dyn TransportAdapter>,
    config: &OtaConfig,
    plan: &UpdatePlan,
    progress: Option<&mut (dyn FnMut(Slot, FlashProgress) + Send + '_)>,
) -> Result<UpdateReport, OtaError> {
    let result = execute(transport.clone(), config, plan, progress).await;

    match &result {
        Ok(report) => info!(
            regions = report.regions.len(),
            unsolicited = report.unsolicited,
            "Update session complete"
        ),
        Err(e) => warn!(error = %e, "Update session aborted"),
    }

    if let Err(e) = transport.disconnect().await {
        warn!(error = %e, "Failed to disconnect");
    }
    result
}

async fn execute(
    transport: Arc<dyn TransportAdapter>,
    config: &OtaConfig,
    plan: &UpdatePlan,
    progress: Option<&mut (dyn FnMut(Slot, FlashProgress) + Send + '_)>,
) -> Result<UpdateReport, OtaError> {
    let channel = CommandChannel::open(transport, &config.channel).await?;
    let mut updater = Updater::new(channel, config.memory_map.clone(), config.flash.chunk_len);

    let result = updater.run(plan, progress).await;
    let unsolicited = updater.into_channel().close().await;

    result.map(|mut report| {
        report.unsolicited = unsolicited;
        report
    })
}
