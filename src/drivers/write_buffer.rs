//! Write accumulator: turns a stream of small sequential writes into whole
//! erase-block commits.
//!
//! Bytes are staged until a block is complete, then the whole block is
//! compared against flash and only erased and programmed when it differs.
//! Writing to address 0 starts a new image. Any other write must continue
//! exactly where the previous one ended.

use core::marker::PhantomData;

use ufmt::derive::uDebug;

use super::self_program::{BlockUpdate, SelfProgram};
use super::trampoline::Trampoline;
use crate::hal::flash::{FlashDevice, FlashError};

#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    /// Address does not continue the current image.
    OutOfSequence,
    /// Data would run past the application area.
    OutOfRange,
    Flash(FlashError),
}

impl From<FlashError> for WriteError {
    fn from(err: FlashError) -> Self {
        WriteError::Flash(err)
    }
}

/// Blocks touched by a write or finalize.
#[derive(Debug, uDebug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub written: u8,
    pub unchanged: u8,
}

impl Progress {
    fn record(&mut self, update: BlockUpdate) {
        match update {
            BlockUpdate::Written => self.written = self.written.saturating_add(1),
            BlockUpdate::Unchanged => self.unchanged = self.unchanged.saturating_add(1),
        }
    }
}

/// Compile-time check that a write buffer holds exactly one erase block.
pub(crate) struct Geometry<F, const N: usize>(PhantomData<F>);

impl<F: FlashDevice, const N: usize> Geometry<F, N> {
    pub(crate) const OK: () = assert!(
        N == F::ERASE_SIZE && F::ERASE_SIZE % F::WRITE_SIZE == 0,
        "write buffer must hold exactly one erase block"
    );
}

pub struct WriteBuffer<const N: usize> {
    staged: [u8; N],
    cursor: u16,
}

impl<const N: usize> WriteBuffer<N> {
    pub const fn new() -> Self {
        Self {
            staged: [0xff; N],
            cursor: 0,
        }
    }

    /// Next address expected by `write`.
    pub fn cursor(&self) -> u16 {
        self.cursor
    }

    pub fn write<F: FlashDevice>(
        &mut self,
        flash: &mut SelfProgram<F>,
        address: u16,
        data: &[u8],
    ) -> Result<Progress, WriteError> {
        let () = Geometry::<F, N>::OK;

        if address == 0 {
            self.cursor = 0;
        }
        if address != self.cursor {
            return Err(WriteError::OutOfSequence);
        }
        let end = u32::from(address) + data.len() as u32;
        if end > u32::from(flash.layout().application_size) {
            return Err(WriteError::OutOfRange);
        }

        let mut progress = Progress::default();
        for &byte in data {
            self.staged[usize::from(self.cursor) % N] = byte;
            self.cursor += 1;
            if usize::from(self.cursor) % N == 0 {
                let start = self.cursor - N as u16;
                match self.commit(flash, start, N) {
                    Ok(update) => progress.record(update),
                    Err(err) => {
                        // the block has to be sent again
                        self.cursor = start;
                        return Err(err.into());
                    }
                }
            }
        }
        Ok(progress)
    }

    /// Commits a trailing partial block, if any.
    pub fn finalize<F: FlashDevice>(
        &mut self,
        flash: &mut SelfProgram<F>,
    ) -> Result<Progress, FlashError> {
        let () = Geometry::<F, N>::OK;

        let mut progress = Progress::default();
        let pending = usize::from(self.cursor) % N;
        if pending != 0 {
            let start = self.cursor - pending as u16;
            progress.record(self.commit(flash, start, pending)?);
        }
        Ok(progress)
    }

    /// Writes the block at `start` from the first `len` staged bytes.
    fn commit<F: FlashDevice>(
        &mut self,
        flash: &mut SelfProgram<F>,
        start: u16,
        len: usize,
    ) -> Result<BlockUpdate, FlashError> {
        let layout = *flash.layout();
        let mut block = [0xffu8; N];
        block[..len].copy_from_slice(&self.staged[..len]);

        if start == 0 {
            if let Some(trampoline) = layout.trampoline {
                let vector = u16::from_le_bytes([block[0], block[1]]);
                let stashed = trampoline.stash(vector).ok_or(FlashError::UnsupportedVector)?;
                Self::write_trampoline(flash, trampoline, stashed)?;
                // address 0 keeps jumping into the bootloader
                block[0] = flash.read_raw(0);
                block[1] = flash.read_raw(1);
            }
        }

        // whatever lies past the application is not ours to change
        let app_end = u32::from(layout.application_size);
        for (offset, byte) in block.iter_mut().enumerate().skip(len) {
            let address = u32::from(start) + offset as u32;
            if address >= app_end {
                *byte = flash.read_raw(address as u16);
            }
        }

        flash.program_block(start, &block)
    }

    fn write_trampoline<F: FlashDevice>(
        flash: &mut SelfProgram<F>,
        trampoline: Trampoline,
        instruction: u16,
    ) -> Result<BlockUpdate, FlashError> {
        let start = trampoline.slot - trampoline.slot % N as u16;
        let mut block = [0u8; N];
        flash.read_raw_into(start, &mut block);
        let at = usize::from(trampoline.slot - start);
        block[at..at + 2].copy_from_slice(&instruction.to_le_bytes());
        flash.program_block(start, &block)
    }
}

impl<const N: usize> Default for WriteBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::self_program::FlashLayout;
    use crate::testing::Tiny841Flash;

    const REDIRECT: [u8; 2] = [0xff, 0xcb]; // rjmp to 0x1800

    fn tiny() -> SelfProgram<Tiny841Flash> {
        let device = Tiny841Flash::with_contents(0, &REDIRECT);
        SelfProgram::new(device, FlashLayout::ATTINY841).unwrap()
    }

    fn image(len: usize) -> Vec<u8> {
        let mut image: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
        image[..2].copy_from_slice(&[0x12, 0xc0]); // rjmp .+36
        image
    }

    fn flash_image<const N: usize>(
        buffer: &mut WriteBuffer<N>,
        flash: &mut SelfProgram<Tiny841Flash>,
        image: &[u8],
        chunk: usize,
    ) -> u8 {
        for (i, part) in image.chunks(chunk).enumerate() {
            buffer.write(flash, (i * chunk) as u16, part).unwrap();
        }
        buffer.finalize(flash).unwrap();
        flash.take_erase_count()
    }

    #[test]
    fn image_reads_back_with_redirect_in_place() {
        let mut flash = tiny();
        let mut buffer = WriteBuffer::<64>::new();
        let image = image(200);

        let erases = flash_image(&mut buffer, &mut flash, &image, 16);
        // four image blocks plus the trampoline block
        assert_eq!(erases, 5);

        let mut read = vec![0; image.len()];
        flash.read(0, &mut read);
        assert_eq!(read, image);

        assert_eq!(flash.read_raw(0), REDIRECT[0]);
        assert_eq!(flash.read_raw(1), REDIRECT[1]);
        assert_eq!(flash.read_raw(2), image[2]);
        // tail of the last block is erased
        assert_eq!(flash.read_raw(200), 0xff);
    }

    #[test]
    fn rewriting_the_same_image_erases_nothing() {
        let mut flash = tiny();
        let mut buffer = WriteBuffer::<64>::new();
        let image = image(150);

        flash_image(&mut buffer, &mut flash, &image, 16);
        let programs = flash.device().program_count();

        assert_eq!(flash_image(&mut buffer, &mut flash, &image, 24), 0);
        assert_eq!(flash.device().program_count(), programs);
    }

    #[test]
    fn gaps_are_rejected_without_touching_flash() {
        let mut flash = tiny();
        let mut buffer = WriteBuffer::<64>::new();
        buffer.write(&mut flash, 0, &image(16)).unwrap();

        assert_eq!(buffer.write(&mut flash, 32, &[1, 2, 3]), Err(WriteError::OutOfSequence));
        assert_eq!(buffer.cursor(), 16);
        assert_eq!(flash.device().erase_count(), 0);
    }

    #[test]
    fn address_zero_restarts_the_image() {
        let mut flash = tiny();
        let mut buffer = WriteBuffer::<64>::new();
        buffer.write(&mut flash, 0, &[0xaa; 20]).unwrap();
        buffer.write(&mut flash, 0, &image(16)).unwrap();
        assert_eq!(buffer.cursor(), 16);

        buffer.finalize(&mut flash).unwrap();
        let mut read = [0; 20];
        flash.read(0, &mut read);
        assert_eq!(&read[..16], &image(16)[..]);
        assert_eq!(&read[16..], &[0xff; 4]);
    }

    #[test]
    fn image_must_fit_the_application() {
        let mut flash = tiny();
        let mut buffer = WriteBuffer::<64>::new();
        let full = vec![0x00; 0x17fe];
        let mut whole = full.clone();
        whole[..2].copy_from_slice(&[0x12, 0xc0]);
        for (i, part) in whole.chunks(28).enumerate() {
            buffer.write(&mut flash, (i * 28) as u16, part).unwrap();
        }
        assert_eq!(buffer.cursor(), 0x17fe);
        assert_eq!(buffer.write(&mut flash, 0x17fe, &[0]), Err(WriteError::OutOfRange));
        buffer.finalize(&mut flash).unwrap();

        // the last block holds the trampoline in its final word
        let stored = u16::from_le_bytes([flash.read_raw(0x17fe), flash.read_raw(0x17ff)]);
        assert_eq!(stored, Trampoline::avr(0x17fe).stash(0xc012).unwrap());
        assert_eq!(flash.read_byte(0x17fd), 0x00);
    }

    #[test]
    fn reset_vector_must_be_relative_jump() {
        let mut flash = tiny();
        let mut buffer = WriteBuffer::<64>::new();
        let mut bad = image(64);
        bad[..2].copy_from_slice(&[0x0c, 0x94]); // jmp
        assert_eq!(
            buffer.write(&mut flash, 0, &bad),
            Err(WriteError::Flash(FlashError::UnsupportedVector))
        );
        assert_eq!(flash.read_raw(0), REDIRECT[0]);
    }

    #[test]
    fn failed_block_rewinds_the_cursor() {
        let mut flash = tiny();
        let mut buffer = WriteBuffer::<64>::new();
        let old = image(192);
        flash_image(&mut buffer, &mut flash, &old, 16);

        let mut device = flash.into_inner();
        device.fail_next(1 << 3);
        let mut flash = SelfProgram::new(device, FlashLayout::ATTINY841).unwrap();

        let mut new = old.clone();
        for byte in &mut new[64..128] {
            *byte = !*byte;
        }
        for (i, part) in new[..112].chunks(16).enumerate() {
            buffer.write(&mut flash, (i * 16) as u16, part).unwrap();
        }
        assert_eq!(
            buffer.write(&mut flash, 112, &new[112..128]),
            Err(WriteError::Flash(FlashError::Hardware(1 << 3)))
        );
        assert_eq!(buffer.cursor(), 64);
        assert_eq!(flash.take_erase_count(), 0);
        assert_eq!(buffer.write(&mut flash, 128, &new[128..144]), Err(WriteError::OutOfSequence));

        for (i, part) in new[64..].chunks(16).enumerate() {
            buffer.write(&mut flash, 64 + (i * 16) as u16, part).unwrap();
        }
        buffer.finalize(&mut flash).unwrap();
        assert_eq!(flash.take_erase_count(), 1);

        let mut read = vec![0; new.len()];
        flash.read(0, &mut read);
        assert_eq!(read, new);
    }

    #[test]
    fn direct_layout_writes_reset_vector_as_is() {
        let device = Tiny841Flash::new();
        let mut flash = SelfProgram::new(device, FlashLayout::direct(0x1800)).unwrap();
        let mut buffer = WriteBuffer::<64>::new();
        let mut raw = image(40);
        raw[..2].copy_from_slice(&[0x0c, 0x94]);

        flash_image(&mut buffer, &mut flash, &raw, 20);
        assert_eq!(&flash.device().contents()[..40], &raw[..]);
    }
}
