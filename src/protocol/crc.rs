//! Frame checksums
//!
//! Both checksums are non-inverted, so running them over a frame that
//! already carries its checksum yields zero.

use crc::{Algorithm, Crc, CRC_16_MODBUS};

/// CRC-8 CCITT (poly 0x07) seeded with 0xff, as produced by avr-libc's
/// `_crc8_ccitt_update`.
const CRC_8_CCITT_FF: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x07,
    init: 0xff,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0xfb,
    residue: 0x00,
};

pub const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_CCITT_FF);

/// CRC-16 IBM/ANSI seeded with 0xffff (the Modbus variant).
pub const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

pub fn crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}

/// CRC-16 over the destination address followed by `data`.
pub fn crc16(address: u8, data: &[u8]) -> u16 {
    let mut digest = CRC16.digest();
    digest.update(&[address]);
    digest.update(data);
    digest.finalize()
}
