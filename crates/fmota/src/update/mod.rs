//! Update orchestration
//!
//! A session runs these steps in order and stops at the first failure:
//!
//! 1. read the bootloader version
//! 2. write soft-device and/or bootloader, or the application
//! 3. write the configuration record describing what was staged
//! 4. optionally read the record back
//! 5. optionally reboot

mod discovery;
mod image;
mod orchestrator;
mod plan;

pub use discovery::select_target;
pub use image::{memory_map, Image, MemoryMap, Slot, SlotRegion};
pub use orchestrator::{run_session, UpdateReport, Updater, WrittenRegion};
pub use plan::{RebootRequest, UpdateMode, UpdatePlan};
