//! CRC-16/MODBUS (reflected poly 0xA001, init 0xFFFF, no final XOR)

use crc::{Crc, CRC_16_MODBUS};

const MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Checksum used by the verify command
pub fn crc16_modbus(data: &[u8]) -> u16 {
    MODBUS.checksum(data)
}
