//! Board identification descriptor
//!
//! 32 bytes programmed at manufacturing time behind the bootloader:
//!
//! | offset | size | field                          |
//! |--------|------|--------------------------------|
//! | 0      | 4    | signature `"BDIF"`             |
//! | 4      | 1    | format version                 |
//! | 5      | 1    | oldest compatible revision     |
//! | 6      | 1    | hardware revision              |
//! | 7      | 1    | reserved                       |
//! | 8      | 4    | manufacturing date, big-endian |
//! | 12     | 4    | serial number                  |
//! | 16     | 16   | extra info                     |

use crate::hal::flash::FlashDevice;

pub const BOARD_INFO_SIZE: usize = 32;
pub const SIGNATURE: [u8; 4] = *b"BDIF";
pub const FORMAT_VERSION: u8 = 1;

/// Revision reported when no valid descriptor is present.
pub const UNKNOWN_REVISION: u8 = 0;

const VERSION: usize = 4;
const COMPATIBLE_REVISION: usize = 5;
const HARDWARE_REVISION: usize = 6;
const SERIAL_NUMBER: core::ops::Range<usize> = 12..16;
const EXTRA_INFO: core::ops::Range<usize> = 16..32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardInfo {
    raw: [u8; BOARD_INFO_SIZE],
}

impl BoardInfo {
    pub fn load<F: FlashDevice>(flash: &F, offset: u16) -> Self {
        let mut raw = [0xff; BOARD_INFO_SIZE];
        for (i, byte) in raw.iter_mut().enumerate() {
            *byte = flash.read_byte(offset.wrapping_add(i as u16));
        }
        Self { raw }
    }

    pub const fn from_bytes(raw: [u8; BOARD_INFO_SIZE]) -> Self {
        Self { raw }
    }

    pub fn is_valid(&self) -> bool {
        self.raw[..4] == SIGNATURE && matches!(self.raw[VERSION], FORMAT_VERSION..=0xfe)
    }

    pub fn compatible_revision(&self) -> u8 {
        self.revision_field(COMPATIBLE_REVISION)
    }

    pub fn hardware_revision(&self) -> u8 {
        self.revision_field(HARDWARE_REVISION)
    }

    pub fn serial_number(&self) -> &[u8] {
        &self.raw[SERIAL_NUMBER]
    }

    pub fn extra_info(&self) -> &[u8] {
        &self.raw[EXTRA_INFO]
    }

    /// Copies up to `out.len()` bytes starting at `offset`, truncated at the
    /// end of the descriptor. Returns the number of bytes copied.
    pub fn read(&self, offset: usize, out: &mut [u8]) -> usize {
        let available = self.raw.get(offset..).unwrap_or(&[]);
        let len = available.len().min(out.len());
        out[..len].copy_from_slice(&available[..len]);
        len
    }

    pub fn as_bytes(&self) -> &[u8; BOARD_INFO_SIZE] {
        &self.raw
    }

    fn revision_field(&self, index: usize) -> u8 {
        if self.is_valid() {
            self.raw[index]
        } else {
            UNKNOWN_REVISION
        }
    }
}
