//! Configuration record written after the images
//!
//! The device bootloader reads this record on boot to learn which staged
//! images to install. Layout (little-endian):
//!
//! ```text
//! 0      4                8                12               16
//! | magic | bootloader_len | softdevice_len | application_len |
//! ```

use bytes::{Buf, BufMut};
use serde::Serialize;

/// Marker identifying a valid record
pub const CONFIG_MAGIC: u32 = 0xCDCD_0001;

/// Encoded record size
pub const CONFIG_RECORD_LEN: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfigRecord {
    pub bootloader_len: u32,
    pub softdevice_len: u32,
    pub application_len: u32,
}

impl ConfigRecord {
    /// Record for a soft-device/bootloader update
    pub fn system(bootloader_len: u32, softdevice_len: u32) -> Self {
        Self {
            bootloader_len,
            softdevice_len,
            application_len: 0,
        }
    }

    /// Record for an application update
    pub fn application(application_len: u32) -> Self {
        Self {
            bootloader_len: 0,
            softdevice_len: 0,
            application_len,
        }
    }

    pub fn encode(&self) -> [u8; CONFIG_RECORD_LEN] {
        let mut out = [0u8; CONFIG_RECORD_LEN];
        let mut buf = &mut out[..];
        buf.put_u32_le(CONFIG_MAGIC);
        buf.put_u32_le(self.bootloader_len);
        buf.put_u32_le(self.softdevice_len);
        buf.put_u32_le(self.application_len);
        out
    }

    /// Decode a record; `None` unless `raw` is exactly one record with the magic
    pub fn decode(mut raw: &[u8]) -> Option<Self> {
        if raw.len() != CONFIG_RECORD_LEN {
            return None;
        }
        if raw.get_u32_le() != CONFIG_MAGIC {
            return None;
        }
        Some(Self {
            bootloader_len: raw.get_u32_le(),
            softdevice_len: raw.get_u32_le(),
            application_len: raw.get_u32_le(),
        })
    }
}

/// Result of reading the record region back from the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigReadout {
    /// Status byte of the read-config response
    pub status: u8,
    /// Bytes following the status byte
    #[serde(serialize_with = "serialize_hex")]
    pub raw: Vec<u8>,
    /// Decoded record, when the raw bytes carry one
    pub record: Option<ConfigRecord>,
}

impl ConfigReadout {
    pub fn from_response(status: u8, raw: Vec<u8>) -> Self {
        let record = ConfigRecord::decode(&raw);
        Self {
            status,
            raw,
            record,
        }
    }
}

fn serialize_hex<S: serde::Serializer>(raw: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_record_layout() {
        let encoded = ConfigRecord::application(300).encode();
        assert_eq!(
            encoded,
            [
                0x01, 0x00, 0xCD, 0xCD, // magic
                0x00, 0x00, 0x00, 0x00, // bootloader
                0x00, 0x00, 0x00, 0x00, // soft-device
                0x2C, 0x01, 0x00, 0x00, // application
            ]
        );
    }

    #[test]
    fn test_decode_written_record() {
        let record = ConfigRecord::system(0x1_8000, 0x2_4000);
        assert_eq!(ConfigRecord::decode(&record.encode()), Some(record));
    }

    #[test]
    fn test_decode_rejects_erased_flash() {
        assert_eq!(ConfigRecord::decode(&[0xFF; CONFIG_RECORD_LEN]), None);
        assert_eq!(ConfigRecord::decode(&[0x01, 0x00, 0xCD, 0xCD]), None);
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut raw = ConfigRecord::application(300).encode().to_vec();
        raw.push(0x00);
        assert_eq!(ConfigRecord::decode(&raw), None);
        assert!(ConfigReadout::from_response(0x60, raw).record.is_none());
    }

    #[test]
    fn test_readout_keeps_raw_bytes() {
        let readout = ConfigReadout::from_response(0x60, vec![0xFF; 16]);
        assert_eq!(readout.status, 0x60);
        assert_eq!(readout.raw.len(), 16);
        assert!(readout.record.is_none());
    }
}
