//! Reset vector relocation
//!
//! On parts whose reset vector always points into the bootloader, the
//! image's own reset vector is moved to a fixed slot just below the
//! bootloader. Leaving the bootloader means jumping to that slot.

/// Re-targets an instruction moved by `offset` bytes so it still reaches
/// its original destination. `None` when the instruction can't be moved.
pub type Relocate = fn(u16, i32) -> Option<u16>;

#[derive(Clone, Copy)]
pub struct Trampoline {
    /// Flash address of the relocated reset vector word.
    pub slot: u16,
    pub relocate: Relocate,
}

impl Trampoline {
    pub const fn avr(slot: u16) -> Self {
        Self {
            slot,
            relocate: offset_relative_jump,
        }
    }

    /// Instruction to store in the slot for a reset vector found at address 0.
    pub fn stash(&self, vector: u16) -> Option<u16> {
        (self.relocate)(vector, -i32::from(self.slot))
    }

    /// Reset vector as the image had it, given the word stored in the slot.
    pub fn restore(&self, stored: u16) -> Option<u16> {
        (self.relocate)(stored, i32::from(self.slot))
    }
}

impl core::fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Trampoline").field("slot", &self.slot).finish()
    }
}

const RJMP_MASK: u16 = 0xe000;
const RJMP_OPCODE: u16 = 0xc000;
const DISPLACEMENT: u16 = 0x0fff;

/// Moves an AVR `rjmp`/`rcall` by `offset` bytes.
///
/// The 12-bit word displacement wraps, matching the way the core wraps
/// program counter arithmetic on parts with 8 KiB of flash.
pub fn offset_relative_jump(instruction: u16, offset: i32) -> Option<u16> {
    if instruction & RJMP_MASK != RJMP_OPCODE {
        return None;
    }
    let jump = (instruction & DISPLACEMENT).wrapping_add((offset / 2) as u16);
    Some((instruction & !DISPLACEMENT) | (jump & DISPLACEMENT))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLOT: u16 = 0x17fe;

    #[test]
    fn rjmp_keeps_its_target() {
        // rjmp .+510 at 0: target word 256
        let trampoline = Trampoline::avr(SLOT);
        let stashed = trampoline.stash(0xc0ff).unwrap();
        assert_eq!(stashed, 0xc500);
        assert_eq!(trampoline.restore(stashed), Some(0xc0ff));
    }

    #[test]
    fn rcall_opcode_survives() {
        let moved = offset_relative_jump(0xd123, -0x100).unwrap();
        assert_eq!(moved & 0xf000, 0xd000);
        assert_eq!(offset_relative_jump(moved, 0x100), Some(0xd123));
    }

    #[test]
    fn jump_back_to_zero() {
        // slot word that lands on address 0 restores to `rjmp .-2`
        let trampoline = Trampoline::avr(SLOT);
        assert_eq!(trampoline.stash(0xcfff), Some(0xc400));
        assert_eq!(trampoline.restore(0xc400), Some(0xcfff));
    }

    #[test]
    fn other_instructions_are_refused() {
        assert_eq!(offset_relative_jump(0x940c, 0x10), None); // jmp
        assert_eq!(offset_relative_jump(0xffff, 0x10), None); // erased
        assert_eq!(offset_relative_jump(0x0000, 0x10), None); // nop
    }
}
