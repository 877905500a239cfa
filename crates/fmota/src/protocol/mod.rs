//! Bootloader command protocol
//!
//! Request/response framing carried over the command and notify
//! characteristics. Every command starts with a two-byte opcode followed by
//! little-endian fields; every response starts with a status byte.

mod channel;
mod command;
mod config_record;
mod crc;
mod error;

pub use channel::CommandChannel;
pub use command::{Command, CommandKind, Response};
pub use config_record::{ConfigReadout, ConfigRecord, CONFIG_MAGIC, CONFIG_RECORD_LEN};
pub use crc::crc16_modbus;
pub use error::CommandError;

/// Command opcodes
pub mod opcode {
    pub const READ_VERSION: [u8; 2] = [0x01, 0x01];
    pub const ERASE: [u8; 2] = [0x0B, 0x2F];
    pub const WRITE: [u8; 2] = [0x0B, 0x20];
    pub const VERIFY: [u8; 2] = [0x0B, 0x10];
    pub const READ_CONFIG: [u8; 2] = [0x0B, 0x00];
    pub const REBOOT: [u8; 2] = [0x0A, 0x20];
    pub const REBOOT_TO_MODE: [u8; 2] = [0x0A, 0x22];
}

/// Status byte of a successful flash command
pub const STATUS_OK: u8 = 0x60;
