//! fmota - flash-transfer protocol engine for over-the-air firmware updates
//!
//! This crate drives a device bootloader over a pair of BLE characteristics:
//! commands are written to one, replies arrive as notifications on the other.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    run_session / Updater                     │
//! │  version ─► images ─► config record ─► readback ─► reboot    │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐ │
//! │  │ UpdatePlan  │  │ MemoryMap   │  │ ConfigRecord        │ │
//! │  │ (mode)      │  │ (slots)     │  │ (magic + lengths)   │ │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘ │
//! │                          │                                  │
//! │                    ┌─────┴─────┐                            │
//! │                    │FlashWriter│                            │
//! │                    │erase/write│                            │
//! │                    │/verify    │                            │
//! │                    └─────┬─────┘                            │
//! │                          │                                  │
//! │                 ┌────────┴────────┐                         │
//! │                 │ CommandChannel  │                         │
//! │                 │ (one in flight) │                         │
//! │                 └────────┬────────┘                         │
//! │                          │                                  │
//! │                 ┌────────┴────────┐                         │
//! │                 │TransportAdapter │                         │
//! │                 │ (BlueZ/mock)    │                         │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod flash;
pub mod protocol;
pub mod transport;
pub mod update;

pub use config::{OtaConfig, TransportConfig};
pub use error::{FlashTarget, OtaError, Result};
pub use flash::{FlashError, FlashProgress, FlashWriter, RegionReport};
pub use protocol::{
    crc16_modbus, Command, CommandChannel, CommandError, ConfigReadout, ConfigRecord, Response,
};
pub use transport::{create_transport, scan, DiscoveredDevice, TransportAdapter, TransportError};
pub use update::{
    run_session, select_target, Image, MemoryMap, RebootRequest, Slot, UpdateMode, UpdatePlan,
    UpdateReport, Updater,
};
