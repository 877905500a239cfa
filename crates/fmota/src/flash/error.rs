//! Flash writer errors

use thiserror::Error;

use crate::protocol::CommandError;

#[derive(Debug, Error, Clone)]
pub enum FlashError {
    #[error("Erase of {length} bytes at 0x{address:08X} failed: {source}")]
    Erase {
        address: u32,
        length: u32,
        #[source]
        source: CommandError,
    },

    #[error("Write of {size} bytes at 0x{address:08X} failed: {source}")]
    Write {
        address: u32,
        size: usize,
        #[source]
        source: CommandError,
    },

    #[error("Verify of {length} bytes at 0x{address:08X} failed: {source}")]
    Verify {
        address: u32,
        length: u32,
        #[source]
        source: CommandError,
    },

    #[error(
        "CRC mismatch at 0x{address:08X}: local 0x{expected:04X}, device 0x{actual:04X}, length 0x{length:X}"
    )]
    CrcMismatch {
        address: u32,
        length: u32,
        expected: u16,
        actual: u16,
    },

    #[error("Region of {length} bytes at 0x{address:08X} exceeds the 32-bit address space")]
    OutOfRange { address: u32, length: usize },
}

impl FlashError {
    /// Whether the device stopped answering during this phase
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FlashError::Erase {
                source: CommandError::Timeout { .. },
                ..
            } | FlashError::Write {
                source: CommandError::Timeout { .. },
                ..
            } | FlashError::Verify {
                source: CommandError::Timeout { .. },
                ..
            }
        )
    }
}
