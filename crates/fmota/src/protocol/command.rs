//! Command encoding and response access

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::{opcode, CommandError, STATUS_OK};

/// A single bootloader command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read the bootloader version string
    ReadVersion,
    /// Erase `length` bytes starting at `address`
    Erase { address: u32, length: u32 },
    /// Program one chunk at `address`
    Write { address: u32, data: Bytes },
    /// Ask the device for the CRC-16 of a flash range
    Verify { address: u32, length: u32 },
    /// Read `length` raw bytes starting at `address`
    ReadConfig { address: u32, length: u8 },
    /// Unconditional reboot
    Reboot,
    /// Reboot into the given mode
    RebootToMode { mode: u8 },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::ReadVersion => CommandKind::ReadVersion,
            Command::Erase { .. } => CommandKind::Erase,
            Command::Write { .. } => CommandKind::Write,
            Command::Verify { .. } => CommandKind::Verify,
            Command::ReadConfig { .. } => CommandKind::ReadConfig,
            Command::Reboot => CommandKind::Reboot,
            Command::RebootToMode { .. } => CommandKind::RebootToMode,
        }
    }

    /// Serialize into the wire frame
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_slice(&self.kind().opcode());
        match self {
            Command::ReadVersion | Command::Reboot => {}
            Command::Erase { address, length } | Command::Verify { address, length } => {
                buf.put_u32_le(*address);
                buf.put_u32_le(*length);
            }
            Command::Write { address, data } => {
                buf.put_u32_le(*address);
                buf.put_slice(data);
            }
            Command::ReadConfig { address, length } => {
                buf.put_u32_le(*address);
                buf.put_u8(*length);
            }
            Command::RebootToMode { mode } => buf.put_u8(*mode),
        }
        buf.freeze()
    }

    fn encoded_len(&self) -> usize {
        2 + match self {
            Command::ReadVersion | Command::Reboot => 0,
            Command::Erase { .. } | Command::Verify { .. } => 8,
            Command::Write { data, .. } => 4 + data.len(),
            Command::ReadConfig { .. } => 5,
            Command::RebootToMode { .. } => 1,
        }
    }
}

/// Command type, used to tag responses and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    ReadVersion,
    Erase,
    Write,
    Verify,
    ReadConfig,
    Reboot,
    RebootToMode,
}

impl CommandKind {
    pub fn opcode(self) -> [u8; 2] {
        match self {
            CommandKind::ReadVersion => opcode::READ_VERSION,
            CommandKind::Erase => opcode::ERASE,
            CommandKind::Write => opcode::WRITE,
            CommandKind::Verify => opcode::VERIFY,
            CommandKind::ReadConfig => opcode::READ_CONFIG,
            CommandKind::Reboot => opcode::REBOOT,
            CommandKind::RebootToMode => opcode::REBOOT_TO_MODE,
        }
    }

    /// Identify a frame by its leading opcode
    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        let op: [u8; 2] = frame.get(..2)?.try_into().ok()?;
        [
            CommandKind::ReadVersion,
            CommandKind::Erase,
            CommandKind::Write,
            CommandKind::Verify,
            CommandKind::ReadConfig,
            CommandKind::Reboot,
            CommandKind::RebootToMode,
        ]
        .into_iter()
        .find(|kind| kind.opcode() == op)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::ReadVersion => "read-version",
            CommandKind::Erase => "erase",
            CommandKind::Write => "write",
            CommandKind::Verify => "verify",
            CommandKind::ReadConfig => "read-config",
            CommandKind::Reboot => "reboot",
            CommandKind::RebootToMode => "reboot-to-mode",
        };
        f.write_str(name)
    }
}

/// Raw response to a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    command: CommandKind,
    data: Vec<u8>,
}

impl Response {
    pub fn new(command: CommandKind, data: Vec<u8>) -> Self {
        Self { command, data }
    }

    pub fn command(&self) -> CommandKind {
        self.command
    }

    /// Whole notification payload
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Leading status byte
    pub fn status(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// Bytes after the status byte
    pub fn payload(&self) -> &[u8] {
        self.data.get(1..).unwrap_or_default()
    }

    /// Require the status byte to be `STATUS_OK`
    pub fn expect_ok(self) -> Result<Self, CommandError> {
        match self.status() {
            Some(STATUS_OK) => Ok(self),
            Some(status) => Err(CommandError::Status {
                command: self.command,
                status,
            }),
            None => Err(self.malformed()),
        }
    }

    /// Require the response to be exactly the `STATUS_OK` byte
    pub fn expect_bare_ok(self) -> Result<Self, CommandError> {
        let response = self.expect_ok()?;
        if response.data.len() != 1 {
            return Err(response.malformed());
        }
        Ok(response)
    }

    /// Parse the CRC carried by a verify response
    pub fn crc16(&self) -> Result<u16, CommandError> {
        let bytes: [u8; 2] = self
            .payload()
            .try_into()
            .map_err(|_| self.malformed())?;
        Ok(u16::from_le_bytes(bytes))
    }

    pub(crate) fn malformed(&self) -> CommandError {
        CommandError::Malformed {
            command: self.command,
            response: hex::encode(&self.data),
        }
    }
}
