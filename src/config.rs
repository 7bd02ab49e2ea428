//! Protocol constants and per-board configuration

use crate::protocol::transport::AddressFilter;

/// Version of the bus protocol spoken by this bootloader.
pub const PROTOCOL_VERSION: u16 = 0x0101;

/// Version of the bootloader firmware itself, reported in the hardware info.
pub const BOOTLOADER_VERSION: u8 = 0x01;

/// Largest frame either direction, envelope included.
pub const MAX_PACKET_LENGTH: usize = 32;

pub const GENERAL_CALL_ADDRESS: u8 = 0x00;

/// Initial listen range: 0x08..=0x0f
pub const INITIAL_ADDRESS: u8 = 0x08;
pub const INITIAL_BITS: u8 = 4;

/// Highest assignable 7-bit address.
pub const MAX_ADDRESS: u8 = 0x7f;

/// Describes one kind of board running the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardConfig {
    /// Board type reported to the host and matched by SET_ADDRESS filters.
    /// Zero is the wildcard and never a valid board type.
    pub hardware_type: u8,
    pub initial_address: u8,
    pub initial_bits: u8,
    /// Flash address of the board-info descriptor.
    pub board_info_offset: u16,
}

impl BoardConfig {
    /// ATtiny841 interface board on I2C.
    pub const INTERFACE_BOARD: BoardConfig = BoardConfig {
        hardware_type: 1,
        initial_address: INITIAL_ADDRESS,
        initial_bits: INITIAL_BITS,
        board_info_offset: 0x1fe0,
    };

    /// Hopper board on RS485.
    pub const GP_HOPPER: BoardConfig = BoardConfig {
        hardware_type: 2,
        initial_address: INITIAL_ADDRESS,
        initial_bits: INITIAL_BITS,
        board_info_offset: 0x7fe0,
    };

    pub const fn address_filter(&self) -> AddressFilter {
        AddressFilter::new(self.initial_address, self.initial_bits)
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self::INTERFACE_BOARD
    }
}

/// Core clock of the ATtiny841 interface board (internal oscillator).
pub const CPU_FREQ_HZ: u32 = 8_000_000;

/// Debug UART, transmit only.
pub const DEBUG_BAUD: u32 = 38_400;
