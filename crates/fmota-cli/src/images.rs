//! Locating image files on disk

use anyhow::{Context, Result};
use fmota::{Image, MemoryMap, Slot};
use std::path::{Path, PathBuf};

/// Image file per slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSources {
    pub softdevice: Option<PathBuf>,
    pub bootloader: Option<PathBuf>,
    pub application: Option<PathBuf>,
}

impl ImageSources {
    /// Explicit paths win; missing slots are filled from `image_dir`
    pub fn resolve(
        bootloader: Option<&Path>,
        softdevice: Option<&Path>,
        application: Option<&Path>,
        image_dir: Option<&Path>,
    ) -> Result<Self> {
        let pick = |explicit: Option<&Path>, keyword: &str| -> Result<Option<PathBuf>> {
            match (explicit, image_dir) {
                (Some(path), _) => Ok(Some(path.to_path_buf())),
                (None, Some(dir)) => find_by_keyword(dir, keyword),
                (None, None) => Ok(None),
            }
        };

        Ok(Self {
            softdevice: pick(softdevice, "sd")?,
            bootloader: pick(bootloader, "bl")?,
            application: pick(application, "app")?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.softdevice.is_none() && self.bootloader.is_none() && self.application.is_none()
    }

    /// Read every listed file and place it in its slot
    pub async fn load(&self, map: &MemoryMap) -> Result<Vec<Image>> {
        let slots = [
            (Slot::SoftDevice, &self.softdevice),
            (Slot::Bootloader, &self.bootloader),
            (Slot::Application, &self.application),
        ];

        let mut images = Vec::new();
        for (slot, path) in slots {
            if let Some(path) = path {
                images.push(map.load(slot, path).await?);
            }
        }
        Ok(images)
    }
}

/// First file in `dir` (by name order) whose name contains `keyword`
pub fn find_by_keyword(dir: &Path, keyword: &str) -> Result<Option<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read image directory: {}", dir.display()))?;

    let mut matches = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("Failed to read image directory: {}", dir.display()))?;
        let path = entry.path();
        let name_matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.contains(keyword));
        if name_matches && path.is_file() {
            matches.push(path);
        }
    }

    matches.sort();
    let found = matches.into_iter().next();
    if let Some(path) = &found {
        tracing::debug!(keyword, path = %path.display(), "Image found");
    }
    Ok(found)
}
