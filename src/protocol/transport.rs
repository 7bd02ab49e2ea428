//! Transport capability and device addressing

use ufmt::derive::uDebug;

use super::crc::{crc16, crc8};
use crate::config::GENERAL_CALL_ADDRESS;

/// How a transport protects its frames.
#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// CRC-8 over command and payload. For buses whose hardware only hands
    /// over frames addressed to this device (I2C).
    Crc8,
    /// CRC-16 over destination address, command and payload. For shared
    /// lines where a corrupted address byte can misdeliver a frame (RS485).
    Crc16,
}

impl Framing {
    pub const fn crc_len(self) -> usize {
        match self {
            Framing::Crc8 => 1,
            Framing::Crc16 => 2,
        }
    }

    /// Reply envelope: status, length and checksum.
    pub const fn overhead(self) -> usize {
        2 + self.crc_len()
    }

    /// A frame that fails its checksum may belong to another device, so it
    /// must not be answered.
    pub const fn drops_bad_crc(self) -> bool {
        matches!(self, Framing::Crc16)
    }

    /// True when `frame`, including its trailing checksum, is intact.
    pub fn check(self, address: u8, frame: &[u8]) -> bool {
        match self {
            Framing::Crc8 => crc8(frame) == 0,
            Framing::Crc16 => crc16(address, frame) == 0,
        }
    }

    /// Appends the checksum over `buffer[..len]` and returns the sealed length.
    ///
    /// The caller guarantees room for `crc_len()` more bytes.
    pub fn seal(self, address: u8, buffer: &mut [u8], len: usize) -> usize {
        match self {
            Framing::Crc8 => {
                buffer[len] = crc8(&buffer[..len]);
            }
            Framing::Crc16 => {
                let crc = crc16(address, &buffer[..len]);
                buffer[len..len + 2].copy_from_slice(&crc.to_le_bytes());
            }
        }
        len + self.crc_len()
    }
}

/// A complete inbound frame sitting in the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    pub address: u8,
    pub len: usize,
    /// Longest reply the other side will take, envelope included.
    pub max_reply: usize,
}

/// Frame-level bus access, implemented per target.
///
/// Bit-level state machines (USI/TWI slave, UART inter-frame timeouts) live
/// behind this trait.
pub trait BusTransport {
    type Error;

    const FRAMING: Framing;

    /// Copies the next complete frame into `buffer`.
    fn receive(&mut self, buffer: &mut [u8]) -> nb::Result<Received, Self::Error>;

    /// Queues a reply to the frame last received.
    fn send(&mut self, reply: &[u8]) -> Result<(), Self::Error>;

    /// Called after the accepted address range changed, for transports that
    /// match addresses in hardware.
    fn set_address(&mut self, _filter: &AddressFilter) {}
}

/// Which 7-bit addresses this device answers to.
///
/// Starts out listening on a masked range, switches to a single exact
/// address once one is assigned. The general call address always matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressFilter {
    initial: u8,
    mask: u8,
    assigned: Option<u8>,
}

impl AddressFilter {
    /// Listen on every address sharing the top `bits` bits with `initial`.
    pub const fn new(initial: u8, bits: u8) -> Self {
        let bits = if bits > 7 { 7 } else { bits };
        let mask = !(0x7f >> bits) & 0x7f;
        Self {
            initial: initial & mask,
            mask,
            assigned: None,
        }
    }

    pub fn matches(&self, address: u8) -> bool {
        if address == GENERAL_CALL_ADDRESS {
            return true;
        }
        match self.assigned {
            Some(assigned) => address == assigned,
            None => address & self.mask == self.initial,
        }
    }

    pub fn assign(&mut self, address: u8) {
        self.assigned = Some(address);
    }

    /// Back to the initial range.
    pub fn reset(&mut self) {
        self.assigned = None;
    }

    pub fn assigned(&self) -> Option<u8> {
        self.assigned
    }

    /// Base address and mask of the initial listen range.
    pub fn initial_range(&self) -> (u8, u8) {
        (self.initial, self.mask)
    }
}
