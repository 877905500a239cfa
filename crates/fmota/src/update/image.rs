//! Firmware images and the device memory map

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::OtaError;
use crate::protocol::CONFIG_RECORD_LEN;

/// Device memory map constants
pub mod memory_map {
    /// Soft-device staging area
    pub const SOFTDEVICE_START: u32 = 0x0004_0000;
    pub const SOFTDEVICE_CAPACITY: u32 = 0x0002_5000;
    /// Bootloader staging area
    pub const BOOTLOADER_START: u32 = 0x0006_5000;
    pub const BOOTLOADER_CAPACITY: u32 = 0x0001_9000;
    /// Application staging area (shared with the soft-device)
    pub const APPLICATION_START: u32 = 0x0004_0000;
    pub const APPLICATION_CAPACITY: u32 = 0x0002_5000;
    /// Configuration record
    pub const CONFIG_RECORD_ADDRESS: u32 = 0x0007_E000;
}

/// Image slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    SoftDevice,
    Bootloader,
    Application,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Slot::SoftDevice => "soft-device",
            Slot::Bootloader => "bootloader",
            Slot::Application => "application",
        };
        f.write_str(name)
    }
}

/// Flash area reserved for one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRegion {
    pub start: u32,
    pub capacity: u32,
}

impl SlotRegion {
    fn end(&self) -> Option<u32> {
        self.start.checked_add(self.capacity)
    }

    fn contains(&self, address: u32) -> bool {
        address >= self.start && self.end().is_some_and(|end| address < end)
    }

    fn overlaps(&self, other: &SlotRegion) -> bool {
        match (self.end(), other.end()) {
            (Some(a_end), Some(b_end)) => self.start < b_end && other.start < a_end,
            _ => true,
        }
    }
}

/// Where each slot lives in device flash
///
/// Soft-device and application share one staging area; the configuration
/// record tells the bootloader which of the two it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMap {
    #[serde(default = "default_softdevice")]
    pub softdevice: SlotRegion,
    #[serde(default = "default_bootloader")]
    pub bootloader: SlotRegion,
    #[serde(default = "default_application")]
    pub application: SlotRegion,
    #[serde(default = "default_config_record")]
    pub config_record: u32,
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self {
            softdevice: default_softdevice(),
            bootloader: default_bootloader(),
            application: default_application(),
            config_record: default_config_record(),
        }
    }
}

fn default_softdevice() -> SlotRegion {
    SlotRegion {
        start: memory_map::SOFTDEVICE_START,
        capacity: memory_map::SOFTDEVICE_CAPACITY,
    }
}

fn default_bootloader() -> SlotRegion {
    SlotRegion {
        start: memory_map::BOOTLOADER_START,
        capacity: memory_map::BOOTLOADER_CAPACITY,
    }
}

fn default_application() -> SlotRegion {
    SlotRegion {
        start: memory_map::APPLICATION_START,
        capacity: memory_map::APPLICATION_CAPACITY,
    }
}

fn default_config_record() -> u32 {
    memory_map::CONFIG_RECORD_ADDRESS
}

impl MemoryMap {
    pub fn region(&self, slot: Slot) -> SlotRegion {
        match slot {
            Slot::SoftDevice => self.softdevice,
            Slot::Bootloader => self.bootloader,
            Slot::Application => self.application,
        }
    }

    /// Reject maps whose regions wrap or collide
    pub fn validate(&self) -> Result<(), OtaError> {
        let slots = [Slot::SoftDevice, Slot::Bootloader, Slot::Application];
        for slot in slots {
            let region = self.region(slot);
            if region.end().is_none() {
                return Err(OtaError::Config(format!(
                    "{} region 0x{:08X}+0x{:X} exceeds the address space",
                    slot, region.start, region.capacity
                )));
            }
            let record_end = self.config_record.checked_add(CONFIG_RECORD_LEN as u32 - 1);
            let record_hits = region.contains(self.config_record)
                || record_end.map_or(true, |end| region.contains(end));
            if record_hits {
                return Err(OtaError::Config(format!(
                    "configuration record 0x{:08X} lies inside the {} region",
                    self.config_record, slot
                )));
            }
        }

        // Soft-device and application share a staging area by design; the
        // bootloader must stay clear of both.
        for slot in [Slot::SoftDevice, Slot::Application] {
            if self.bootloader.overlaps(&self.region(slot)) {
                return Err(OtaError::Config(format!(
                    "bootloader region overlaps the {} region",
                    slot
                )));
            }
        }
        Ok(())
    }

    /// Bind image data to its slot address
    pub fn place(&self, slot: Slot, data: impl Into<Bytes>) -> Result<Image, OtaError> {
        let data = data.into();
        let region = self.region(slot);

        if data.is_empty() {
            return Err(OtaError::Image(format!("{} image is empty", slot)));
        }
        if data.len() > region.capacity as usize {
            return Err(OtaError::Image(format!(
                "{} image is {} bytes, slot at 0x{:08X} holds {}",
                slot,
                data.len(),
                region.start,
                region.capacity
            )));
        }

        Ok(Image {
            slot,
            address: region.start,
            data,
        })
    }

    /// Read an image file and place it
    pub async fn load(&self, slot: Slot, path: impl AsRef<Path>) -> Result<Image, OtaError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|source| OtaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(%slot, path = %path.display(), size = data.len(), "Image loaded");
        self.place(slot, data)
    }
}

/// Firmware blob bound to a flash address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    slot: Slot,
    address: u32,
    data: Bytes,
}

impl Image {
    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> u32 {
        // place() bounds the length by a u32 capacity
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
