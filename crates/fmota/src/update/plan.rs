//! What one session should do

use serde::Serialize;

use super::{Image, Slot};

/// Reboot issued at the end of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "mode")]
pub enum RebootRequest {
    #[default]
    None,
    /// Plain reset
    Reset,
    /// Reset into the given boot mode
    ToMode(u8),
}

impl RebootRequest {
    /// `--reboot-to` wins over a plain `--reboot`
    pub fn from_flags(reboot: bool, reboot_to: Option<u8>) -> Self {
        match (reboot_to, reboot) {
            (Some(mode), _) => RebootRequest::ToMode(mode),
            (None, true) => RebootRequest::Reset,
            (None, false) => RebootRequest::None,
        }
    }
}

/// Which images get written
///
/// Soft-device and application are staged at the same address, so a session
/// writes either system images or an application, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode<'a> {
    System {
        softdevice: Option<&'a Image>,
        bootloader: Option<&'a Image>,
    },
    Application(&'a Image),
    /// Nothing to write
    Idle,
}

/// Images and follow-up actions for a session
#[derive(Debug, Clone, Default)]
pub struct UpdatePlan {
    pub softdevice: Option<Image>,
    pub bootloader: Option<Image>,
    pub application: Option<Image>,
    /// Read the configuration record back after writing
    pub read_config: bool,
    pub reboot: RebootRequest,
}

impl UpdatePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an image in the field matching its slot
    pub fn with_image(mut self, image: Image) -> Self {
        match image.slot() {
            Slot::SoftDevice => self.softdevice = Some(image),
            Slot::Bootloader => self.bootloader = Some(image),
            Slot::Application => self.application = Some(image),
        }
        self
    }

    pub fn with_read_config(mut self, read_config: bool) -> Self {
        self.read_config = read_config;
        self
    }

    pub fn with_reboot(mut self, reboot: RebootRequest) -> Self {
        self.reboot = reboot;
        self
    }

    pub fn mode(&self) -> UpdateMode<'_> {
        if self.softdevice.is_some() || self.bootloader.is_some() {
            UpdateMode::System {
                softdevice: self.softdevice.as_ref(),
                bootloader: self.bootloader.as_ref(),
            }
        } else if let Some(app) = &self.application {
            UpdateMode::Application(app)
        } else {
            UpdateMode::Idle
        }
    }

    /// Application image that the system mode will leave untouched
    pub fn ignored_application(&self) -> Option<&Image> {
        match self.mode() {
            UpdateMode::System { .. } => self.application.as_ref(),
            _ => None,
        }
    }

    /// Nothing to write, read or reboot
    pub fn is_empty(&self) -> bool {
        matches!(self.mode(), UpdateMode::Idle)
            && !self.read_config
            && self.reboot == RebootRequest::None
    }
}
