//! Bootloader session
//!
//! One `Bootloader` holds everything a bootloader run needs: flash access,
//! the write accumulator, board identity, the address filter and the exit
//! request. The board glue builds it once and calls `run` with its bus.

mod commands;

use ufmt::derive::uDebug;
use ufmt::uWrite;

use crate::config::{BoardConfig, GENERAL_CALL_ADDRESS, MAX_PACKET_LENGTH};
use crate::drivers::board_info::BoardInfo;
use crate::drivers::self_program::SelfProgram;
use crate::drivers::write_buffer::{Geometry, WriteBuffer};
use crate::hal::flash::FlashDevice;
use crate::hal::gpio::ChildSelect;
use crate::logger::{log, Level, Logger};
use crate::protocol::packet;
use crate::protocol::transport::{AddressFilter, BusTransport, Framing};

/// Why the session ended.
#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    StartApplication,
    Reset,
}

pub struct Bootloader<F, C, W, const N: usize> {
    board: BoardConfig,
    flash: SelfProgram<F>,
    writer: WriteBuffer<N>,
    info: BoardInfo,
    children: C,
    address: AddressFilter,
    address_changed: bool,
    exit: Option<SessionExit>,
    logger: Logger<W>,
}

impl<F, C, W, const N: usize> Bootloader<F, C, W, N>
where
    F: FlashDevice,
    C: ChildSelect,
    W: uWrite,
{
    pub fn new(board: BoardConfig, flash: SelfProgram<F>, children: C, logger: Logger<W>) -> Self {
        let () = Geometry::<F, N>::OK;
        let info = BoardInfo::load(flash.device(), board.board_info_offset);
        let mut bootloader = Self {
            board,
            flash,
            writer: WriteBuffer::new(),
            info,
            children,
            address: board.address_filter(),
            address_changed: false,
            exit: None,
            logger,
        };

        let hardware_type = board.hardware_type;
        let revision = info.hardware_revision();
        log!(bootloader.logger, Level::Info, "bootloader hw {} rev {}", hardware_type, revision);
        if !info.is_valid() {
            log!(bootloader.logger, Level::Warn, "no board info");
        }
        bootloader
    }

    /// Serves frames until the host asks to leave.
    pub fn run<T: BusTransport>(&mut self, transport: &mut T) -> Result<SessionExit, T::Error> {
        let mut buffer = [0u8; MAX_PACKET_LENGTH];
        transport.set_address(&self.address);
        loop {
            self.poll(transport, &mut buffer)?;
            if let Some(exit) = self.exit {
                log!(self.logger, Level::Info, "leaving: {:?}", exit);
                return Ok(exit);
            }
        }
    }

    /// Handles at most one frame. `Ok` without doing anything when no frame
    /// is waiting.
    pub fn poll<T: BusTransport>(
        &mut self,
        transport: &mut T,
        buffer: &mut [u8],
    ) -> Result<(), T::Error> {
        let frame = match transport.receive(buffer) {
            Ok(frame) => frame,
            Err(nb::Error::WouldBlock) => return Ok(()),
            Err(nb::Error::Other(err)) => return Err(err),
        };

        if !self.address.matches(frame.address) {
            let address = frame.address;
            log!(self.logger, Level::Debug, "ignored frame for {}", address);
            return Ok(());
        }

        let max_reply = frame.max_reply.min(buffer.len());
        if let Some(len) = self.handle_frame(T::FRAMING, frame.address, buffer, frame.len, max_reply) {
            transport.send(&buffer[..len])?;
        }

        // only after the reply went out under the old address
        if core::mem::take(&mut self.address_changed) {
            transport.set_address(&self.address);
        }
        Ok(())
    }

    /// Runs one received frame through the command set and leaves the reply
    /// in `buffer`. Returns the reply length, `None` when nothing is sent.
    pub fn handle_frame(
        &mut self,
        framing: Framing,
        address: u8,
        buffer: &mut [u8],
        len: usize,
        max_reply: usize,
    ) -> Option<usize> {
        let len = len.min(buffer.len());
        let cmd = buffer[..len].first().copied();

        if address != GENERAL_CALL_ADDRESS
            && framing.drops_bad_crc()
            && len > framing.crc_len()
            && !framing.check(address, &buffer[..len])
        {
            log!(self.logger, Level::Warn, "crc error from {}", address);
        }

        let reply = packet::deliver(self, framing, address, buffer, len, max_reply);
        if let (Some(cmd), Some(reply_len)) = (cmd, reply) {
            let status = buffer[0];
            log!(
                self.logger,
                Level::Debug,
                "@{} cmd {} status {} reply {}",
                address,
                cmd,
                status,
                reply_len
            );
        }
        reply
    }

    pub fn address_filter(&self) -> &AddressFilter {
        &self.address
    }

    pub fn exit_requested(&self) -> Option<SessionExit> {
        self.exit
    }

    pub fn flash(&self) -> &SelfProgram<F> {
        &self.flash
    }

    pub fn board_info(&self) -> &BoardInfo {
        &self.info
    }

    pub fn logger(&self) -> &Logger<W> {
        &self.logger
    }
}

#[cfg(all(feature = "attiny841", target_arch = "avr"))]
impl SessionExit {
    /// Leaves the bootloader for good.
    pub fn perform(self, layout: &crate::drivers::self_program::FlashLayout) -> ! {
        match self {
            SessionExit::Reset => crate::hal::watchdog::reset(),
            SessionExit::StartApplication => {
                let entry = layout.trampoline.map(|t| t.slot).unwrap_or(0);
                jump_to(entry)
            }
        }
    }
}

#[cfg(all(feature = "attiny841", target_arch = "avr"))]
fn jump_to(address: u16) -> ! {
    avr_device::interrupt::disable();
    unsafe {
        core::arch::asm!(
            "ijmp",
            in("Z") address / 2,
            options(noreturn)
        );
    }
}
