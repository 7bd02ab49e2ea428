//! Self-programming: checked access to the application area of flash
//!
//! Everything below `writable_end` belongs to the application (plus the
//! trampoline slot). The bootloader and the board info behind it are
//! readable but never erased or programmed.

use ufmt::derive::uDebug;

use super::trampoline::Trampoline;
use crate::hal::flash::{FlashDevice, FlashError};

#[derive(Debug, Clone, Copy)]
pub struct FlashLayout {
    /// Bytes available to the application image.
    pub application_size: u16,
    /// First address that must never be erased or programmed.
    pub writable_end: u32,
    pub trampoline: Option<Trampoline>,
}

impl FlashLayout {
    /// ATtiny841: 8 KiB flash, bootloader from 0x1800, reset vector
    /// relocated to the last application word.
    pub const ATTINY841: FlashLayout = FlashLayout {
        application_size: 0x17fe,
        writable_end: 0x1800,
        trampoline: Some(Trampoline::avr(0x17fe)),
    };

    /// Layout for parts that can boot straight into the application.
    pub const fn direct(application_size: u16) -> Self {
        Self {
            application_size,
            writable_end: application_size as u32,
            trampoline: None,
        }
    }

    pub fn validate(&self, erase_size: usize) -> Result<(), FlashError> {
        let app_end = u32::from(self.application_size);
        if app_end > self.writable_end || self.writable_end > 0x1_0000 {
            return Err(FlashError::OutOfRange);
        }
        if self.writable_end % erase_size as u32 != 0 {
            return Err(FlashError::InvalidPage);
        }
        if let Some(trampoline) = self.trampoline {
            let slot = u32::from(trampoline.slot);
            if slot % 2 != 0 || slot < app_end || slot + 2 > self.writable_end {
                return Err(FlashError::OutOfRange);
            }
        }
        Ok(())
    }
}

/// Result of bringing one erase block to a desired content.
#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
pub enum BlockUpdate {
    Unchanged,
    Written,
}

pub struct SelfProgram<F> {
    device: F,
    layout: FlashLayout,
    erase_count: u8,
}

impl<F: FlashDevice> SelfProgram<F> {
    const GEOMETRY_OK: () = assert!(
        F::WRITE_SIZE > 0 && F::ERASE_SIZE % F::WRITE_SIZE == 0,
        "erase size must be a multiple of the write size"
    );

    pub fn new(device: F, layout: FlashLayout) -> Result<Self, FlashError> {
        let () = Self::GEOMETRY_OK;
        layout.validate(F::ERASE_SIZE)?;
        Ok(Self {
            device,
            layout,
            erase_count: 0,
        })
    }

    pub fn layout(&self) -> &FlashLayout {
        &self.layout
    }

    pub fn device(&self) -> &F {
        &self.device
    }

    pub fn into_inner(self) -> F {
        self.device
    }

    /// Flash content exactly as stored.
    pub fn read_raw(&self, address: u16) -> u8 {
        self.device.read_byte(address)
    }

    pub fn read_raw_into(&self, address: u16, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.device.read_byte(address.wrapping_add(i as u16));
        }
    }

    /// Flash content as the application image sees it: the reset vector
    /// reads back as it was written, not as the bootloader redirect.
    pub fn read_byte(&self, address: u16) -> u8 {
        match self.layout.trampoline {
            Some(trampoline) if address < 2 => {
                let slot = trampoline.slot;
                let stored = u16::from_le_bytes([
                    self.device.read_byte(slot),
                    self.device.read_byte(slot + 1),
                ]);
                match trampoline.restore(stored) {
                    Some(vector) => vector.to_le_bytes()[address as usize],
                    None => 0xff,
                }
            }
            _ => self.device.read_byte(address),
        }
    }

    pub fn read(&self, address: u16, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.read_byte(address.wrapping_add(i as u16));
        }
    }

    pub fn erase_block(&mut self, address: u16) -> Result<(), FlashError> {
        if usize::from(address) % F::ERASE_SIZE != 0 {
            return Err(FlashError::InvalidPage);
        }
        self.check_range(address, F::ERASE_SIZE)?;
        self.device.start_erase(address)?;
        nb::block!(self.device.poll())?;
        self.erase_count = self.erase_count.saturating_add(1);
        Ok(())
    }

    pub fn write_page(&mut self, address: u16, data: &[u8]) -> Result<(), FlashError> {
        if data.is_empty()
            || data.len() > F::WRITE_SIZE
            || usize::from(address) % F::WRITE_SIZE != 0
        {
            return Err(FlashError::InvalidPage);
        }
        self.check_range(address, data.len())?;
        self.device.start_program(address, data)?;
        nb::block!(self.device.poll())
    }

    /// Brings the erase block at `start` to `image`. Skips the erase when
    /// flash already holds it, and pages that stay erased.
    pub fn program_block(&mut self, start: u16, image: &[u8]) -> Result<BlockUpdate, FlashError> {
        debug_assert_eq!(image.len(), F::ERASE_SIZE);
        let unchanged = image
            .iter()
            .enumerate()
            .all(|(i, &byte)| self.device.read_byte(start + i as u16) == byte);
        if unchanged {
            return Ok(BlockUpdate::Unchanged);
        }

        self.erase_block(start)?;
        for (i, page) in image.chunks(F::WRITE_SIZE).enumerate() {
            if page.iter().all(|&byte| byte == 0xff) {
                continue;
            }
            self.write_page(start + (i * F::WRITE_SIZE) as u16, page)?;
        }
        Ok(BlockUpdate::Written)
    }

    /// Completed erases since the last call. Failed erases are not counted.
    pub fn take_erase_count(&mut self) -> u8 {
        core::mem::take(&mut self.erase_count)
    }

    pub fn erase_count(&self) -> u8 {
        self.erase_count
    }

    fn check_range(&self, address: u16, len: usize) -> Result<(), FlashError> {
        if u32::from(address) + len as u32 > self.layout.writable_end {
            return Err(FlashError::OutOfRange);
        }
        Ok(())
    }
}
