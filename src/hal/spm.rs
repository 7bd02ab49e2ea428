//! ATtiny841 self-programming through SPM
//!
//! The CPU halts during page erase and page write, so by the time `spm`
//! returns the operation is done. `poll` still checks SPMEN so the shape
//! matches parts with a real busy flag.

use core::arch::asm;

use super::flash::{FlashDevice, FlashError};

// I/O address of SPMCSR
const SPMCSR: u8 = 0x37;

const SPMEN: u8 = 1 << 0;
const PGERS: u8 = 1 << 1;
const PGWRT: u8 = 1 << 2;
const CTPB: u8 = 1 << 4;

pub struct SpmFlash {
    _private: (),
}

impl SpmFlash {
    /// # Safety
    ///
    /// Only one instance may exist, and nothing else may drive SPMCSR.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }

    fn spmcsr(&self) -> u8 {
        let value: u8;
        unsafe {
            asm!("in {0}, {1}", out(reg) value, const SPMCSR, options(nomem, nostack));
        }
        value
    }
}

/// Issues one SPM instruction with `word` in r1:r0 and `address` in Z.
#[inline(always)]
unsafe fn spm(command: u8, address: u16, word: u16) {
    avr_device::interrupt::free(|_| {
        asm!(
            "movw r0, {word}",
            "out {spmcsr}, {command}",
            "spm",
            "clr r1",
            word = in(reg_pair) word,
            command = in(reg) command,
            spmcsr = const SPMCSR,
            in("Z") address,
        );
    });
}

impl FlashDevice for SpmFlash {
    const WRITE_SIZE: usize = 16;
    const ERASE_SIZE: usize = 64;

    fn read_byte(&self, address: u16) -> u8 {
        let value: u8;
        unsafe {
            asm!(
                "lpm {0}, Z",
                out(reg) value,
                in("Z") address,
                options(readonly, nostack, preserves_flags)
            );
        }
        value
    }

    fn start_erase(&mut self, address: u16) -> Result<(), FlashError> {
        unsafe { spm(PGERS | SPMEN, address, 0) };
        Ok(())
    }

    fn start_program(&mut self, address: u16, data: &[u8]) -> Result<(), FlashError> {
        unsafe {
            spm(CTPB | SPMEN, address, 0);
            for (i, pair) in data.chunks(2).enumerate() {
                let word = u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(0xff)]);
                spm(SPMEN, address + 2 * i as u16, word);
            }
            spm(PGWRT | SPMEN, address, 0);
        }
        Ok(())
    }

    fn poll(&mut self) -> nb::Result<(), FlashError> {
        if self.spmcsr() & SPMEN != 0 {
            return Err(nb::Error::WouldBlock);
        }
        Ok(())
    }
}
