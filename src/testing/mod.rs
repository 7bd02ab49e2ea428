//! Host-side stand-ins for target hardware

use crate::hal::flash::{FlashDevice, FlashError};

/// RAM-backed flash with NOR semantics: erase sets a block to 0xff,
/// programming can only clear bits.
#[derive(Clone)]
pub struct SimFlash<const SIZE: usize, const WRITE: usize, const ERASE: usize> {
    memory: [u8; SIZE],
    busy_cycles: u8,
    busy: u8,
    fail_bits: Option<u16>,
    pending: Option<u16>,
    erases: usize,
    programs: usize,
}

/// Geometry of the ATtiny841.
pub type Tiny841Flash = SimFlash<8192, 16, 64>;

impl<const SIZE: usize, const WRITE: usize, const ERASE: usize> SimFlash<SIZE, WRITE, ERASE> {
    pub const fn new() -> Self {
        Self {
            memory: [0xff; SIZE],
            busy_cycles: 0,
            busy: 0,
            fail_bits: None,
            pending: None,
            erases: 0,
            programs: 0,
        }
    }

    pub fn with_contents(address: usize, bytes: &[u8]) -> Self {
        let mut flash = Self::new();
        flash.memory[address..address + bytes.len()].copy_from_slice(bytes);
        flash
    }

    pub fn contents(&self) -> &[u8] {
        &self.memory
    }

    /// Direct access, bypassing flash semantics.
    pub fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// Number of `poll` calls each operation stays busy for.
    pub fn set_busy_cycles(&mut self, cycles: u8) {
        self.busy_cycles = cycles;
    }

    /// The next erase or program leaves flash untouched and reports `bits`.
    pub fn fail_next(&mut self, bits: u16) {
        self.fail_bits = Some(bits);
    }

    pub fn erase_count(&self) -> usize {
        self.erases
    }

    pub fn program_count(&self) -> usize {
        self.programs
    }

    fn begin(&mut self) -> bool {
        self.busy = self.busy_cycles;
        self.pending = self.fail_bits.take();
        self.pending.is_none()
    }
}

impl<const SIZE: usize, const WRITE: usize, const ERASE: usize> Default
    for SimFlash<SIZE, WRITE, ERASE>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize, const WRITE: usize, const ERASE: usize> FlashDevice
    for SimFlash<SIZE, WRITE, ERASE>
{
    const WRITE_SIZE: usize = WRITE;
    const ERASE_SIZE: usize = ERASE;

    fn read_byte(&self, address: u16) -> u8 {
        self.memory.get(usize::from(address)).copied().unwrap_or(0xff)
    }

    fn start_erase(&mut self, address: u16) -> Result<(), FlashError> {
        let start = usize::from(address);
        if start % ERASE != 0 || start + ERASE > SIZE {
            return Err(FlashError::InvalidPage);
        }
        self.erases += 1;
        if self.begin() {
            self.memory[start..start + ERASE].fill(0xff);
        }
        Ok(())
    }

    fn start_program(&mut self, address: u16, data: &[u8]) -> Result<(), FlashError> {
        let start = usize::from(address);
        if start % WRITE != 0 || data.is_empty() || data.len() > WRITE || start + data.len() > SIZE {
            return Err(FlashError::InvalidPage);
        }
        self.programs += 1;
        if self.begin() {
            for (cell, &byte) in self.memory[start..].iter_mut().zip(data) {
                *cell &= byte;
            }
        }
        Ok(())
    }

    fn poll(&mut self) -> nb::Result<(), FlashError> {
        if self.busy > 0 {
            self.busy -= 1;
            return Err(nb::Error::WouldBlock);
        }
        match self.pending.take() {
            Some(bits) => Err(nb::Error::Other(FlashError::Hardware(bits))),
            None => Ok(()),
        }
    }
}
