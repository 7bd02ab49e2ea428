//! Flash device capability

use core::fmt;
use ufmt::derive::uDebug;

/// Erase/program access to on-chip flash.
///
/// Erase and program are split into a start call and completion polling so
/// targets with a busy flag and targets that stall the CPU share one shape.
pub trait FlashDevice {
    /// Program granularity in bytes.
    const WRITE_SIZE: usize;
    /// Erase granularity in bytes, a multiple of `WRITE_SIZE`.
    const ERASE_SIZE: usize;

    fn read_byte(&self, address: u16) -> u8;

    /// Starts erasing the block at `address`.
    fn start_erase(&mut self, address: u16) -> Result<(), FlashError>;

    /// Starts programming one page at `address`. The page must be erased.
    fn start_program(&mut self, address: u16, data: &[u8]) -> Result<(), FlashError>;

    /// Completion of the last erase or program. Error flags raised by the
    /// hardware come back as `FlashError::Hardware`.
    fn poll(&mut self) -> nb::Result<(), FlashError>;
}

#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// Empty, misaligned or oversized page write, or misaligned erase.
    InvalidPage,
    /// The image's reset vector is not a relative jump.
    UnsupportedVector,
    /// Target lies outside the writable region.
    OutOfRange,
    /// Raw status bits reported by the flash controller.
    Hardware(u16),
}

impl FlashError {
    /// One-byte code carried in FAILED replies.
    pub fn code(self) -> u8 {
        match self {
            FlashError::InvalidPage => 1,
            FlashError::UnsupportedVector => 2,
            FlashError::OutOfRange => 3,
            FlashError::Hardware(bits) => pack_status_bits(bits),
        }
    }
}

/// Packs controller error bits into one byte: set-bit count in the upper
/// nibble, index of the lowest set bit in the lower one.
///
/// Never yields a value below 0x10, so it cannot collide with the
/// bootloader's own codes.
pub fn pack_status_bits(bits: u16) -> u8 {
    if bits == 0 {
        return 0x10;
    }
    let count = bits.count_ones().min(15) as u8;
    let first = bits.trailing_zeros() as u8;
    (count << 4) | first
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashError::InvalidPage => write!(f, "invalid page write"),
            FlashError::UnsupportedVector => write!(f, "reset vector is not a relative jump"),
            FlashError::OutOfRange => write!(f, "address outside writable flash"),
            FlashError::Hardware(bits) => write!(f, "flash controller error {:#06x}", bits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes() {
        assert_eq!(FlashError::InvalidPage.code(), 1);
        assert_eq!(FlashError::UnsupportedVector.code(), 2);
        assert_eq!(FlashError::OutOfRange.code(), 3);
    }

    #[test]
    fn status_bits_pack_count_and_first_index() {
        assert_eq!(pack_status_bits(1 << 3), 0x13);
        assert_eq!(pack_status_bits((1 << 4) | (1 << 5)), 0x24);
        assert_eq!(pack_status_bits(0xffff), 0xf0);
        assert!(FlashError::Hardware(0).code() >= 0x10);
    }

    #[test]
    fn display() {
        assert_eq!(
            FlashError::Hardware(0x10).to_string(),
            "flash controller error 0x0010"
        );
    }
}
