//! Command set
//!
//! Multi-byte wire fields are big-endian. Every handler checks its own
//! payload length before touching any state.

use ufmt::uWrite;

use super::{Bootloader, SessionExit};
use crate::config::{BOOTLOADER_VERSION, GENERAL_CALL_ADDRESS, MAX_ADDRESS, PROTOCOL_VERSION};
use crate::drivers::write_buffer::{Progress, WriteError};
use crate::hal::flash::{FlashDevice, FlashError};
use crate::hal::gpio::{ChildSelect, SelectError};
use crate::logger::{log, Level};
use crate::protocol::packet::{reply, CommandProcessor};
use crate::protocol::{CmdResult, Command, GeneralCallCommand, Status};

impl<F, C, W, const N: usize> CommandProcessor for Bootloader<F, C, W, N>
where
    F: FlashDevice,
    C: ChildSelect,
    W: uWrite,
{
    fn process(&mut self, cmd: u8, input: &[u8], output: &mut [u8]) -> CmdResult {
        let command = match Command::try_from(cmd) {
            Ok(command) => command,
            Err(unknown) => {
                log!(self.logger, Level::Debug, "unknown command {}", unknown);
                return Status::NotSupported.into();
            }
        };

        match command {
            Command::GetProtocolVersion => self.get_protocol_version(input, output),
            Command::SetAddress => self.set_address(input),
            Command::PowerUpDisplay => Status::NotSupported.into(),
            Command::GetHardwareInfo => self.get_hardware_info(input, output),
            Command::StartApplication => self.start_application(input),
            Command::WriteFlash => self.write_flash(input, output),
            Command::FinalizeFlash => self.finalize_flash(input, output),
            Command::ReadFlash => self.read_flash(input, output),
            Command::GetHardwareRevision => self.get_hardware_revision(input, output),
            Command::GetSerialNumber => self.get_serial_number(input, output),
            Command::GetNumChildren => self.get_num_children(input, output),
            Command::SetChildSelect => self.set_child_select(input),
            Command::GetExtraInfo => self.get_extra_info(input, output),
            Command::ReadBoardInfo => self.read_board_info(input, output),
        }
    }

    fn general_call(&mut self, cmd: u8) {
        match GeneralCallCommand::from_byte(cmd) {
            Some(GeneralCallCommand::Reset) => {
                log!(self.logger, Level::Info, "general call: reset");
                self.exit = Some(SessionExit::Reset);
            }
            Some(GeneralCallCommand::ResetAddress) => {
                log!(self.logger, Level::Info, "general call: reset address");
                self.address.reset();
                self.address_changed = true;
            }
            None => {
                log!(self.logger, Level::Debug, "general call {} ignored", cmd);
            }
        }
    }
}

impl<F, C, W, const N: usize> Bootloader<F, C, W, N>
where
    F: FlashDevice,
    C: ChildSelect,
    W: uWrite,
{
    fn get_protocol_version(&mut self, input: &[u8], output: &mut [u8]) -> CmdResult {
        if !input.is_empty() {
            return Status::InvalidArguments.into();
        }
        reply(output, &PROTOCOL_VERSION.to_be_bytes())
    }

    /// `[address, hardware type filter]`. A filter naming another board type
    /// means the command is for someone else sharing the range.
    fn set_address(&mut self, input: &[u8]) -> CmdResult {
        let &[address, filter] = input else {
            return Status::InvalidArguments.into();
        };
        if filter != 0 && filter != self.board.hardware_type {
            return CmdResult::NO_REPLY;
        }
        if address == GENERAL_CALL_ADDRESS || address > MAX_ADDRESS {
            return Status::InvalidArguments.into();
        }

        self.address.assign(address);
        self.address_changed = true;
        log!(self.logger, Level::Info, "address set to {}", address);
        CmdResult::ok(0)
    }

    /// `[hardware type, compatible revision, bootloader version, available
    /// flash (2)]`
    fn get_hardware_info(&mut self, input: &[u8], output: &mut [u8]) -> CmdResult {
        if !input.is_empty() {
            return Status::InvalidArguments.into();
        }
        let [size_hi, size_lo] = self.flash.layout().application_size.to_be_bytes();
        let info = [
            self.board.hardware_type,
            self.info.compatible_revision(),
            BOOTLOADER_VERSION,
            size_hi,
            size_lo,
        ];
        reply(output, &info)
    }

    fn start_application(&mut self, input: &[u8]) -> CmdResult {
        if !input.is_empty() {
            return Status::InvalidArguments.into();
        }
        self.exit = Some(SessionExit::StartApplication);
        CmdResult::ok(0)
    }

    /// `[address (2), data..]`
    fn write_flash(&mut self, input: &[u8], output: &mut [u8]) -> CmdResult {
        let [hi, lo, data @ ..] = input else {
            return Status::InvalidArguments.into();
        };
        let address = u16::from_be_bytes([*hi, *lo]);

        match self.writer.write(&mut self.flash, address, data) {
            Ok(progress) => {
                self.log_progress(progress);
                CmdResult::ok(0)
            }
            Err(WriteError::OutOfSequence) => {
                let expected = self.writer.cursor();
                log!(self.logger, Level::Warn, "write at {}, expected {}", address, expected);
                Status::InvalidArguments.into()
            }
            Err(WriteError::OutOfRange) => {
                log!(self.logger, Level::Warn, "write at {} past application end", address);
                Status::InvalidArguments.into()
            }
            Err(WriteError::Flash(err)) => self.flash_failed(err, output),
        }
    }

    /// Reply: number of erases since the previous finalize.
    fn finalize_flash(&mut self, input: &[u8], output: &mut [u8]) -> CmdResult {
        if !input.is_empty() {
            return Status::InvalidArguments.into();
        }
        match self.writer.finalize(&mut self.flash) {
            Ok(progress) => {
                self.log_progress(progress);
                let erases = self.flash.take_erase_count();
                log!(self.logger, Level::Info, "flash finalized, {} erases", erases);
                reply(output, &[erases])
            }
            Err(err) => self.flash_failed(err, output),
        }
    }

    /// `[address (2), length]`
    fn read_flash(&mut self, input: &[u8], output: &mut [u8]) -> CmdResult {
        let &[hi, lo, len] = input else {
            return Status::InvalidArguments.into();
        };
        let address = u16::from_be_bytes([hi, lo]);
        let len = usize::from(len);
        if len > output.len() || usize::from(address) + len > 0x1_0000 {
            return Status::InvalidArguments.into();
        }
        self.flash.read(address, &mut output[..len]);
        CmdResult::ok(len as u8)
    }

    fn get_hardware_revision(&mut self, input: &[u8], output: &mut [u8]) -> CmdResult {
        if !input.is_empty() {
            return Status::InvalidArguments.into();
        }
        reply(output, &[self.info.hardware_revision()])
    }

    fn get_serial_number(&mut self, input: &[u8], output: &mut [u8]) -> CmdResult {
        if !input.is_empty() {
            return Status::InvalidArguments.into();
        }
        reply(output, self.info.serial_number())
    }

    fn get_extra_info(&mut self, input: &[u8], output: &mut [u8]) -> CmdResult {
        if !input.is_empty() {
            return Status::InvalidArguments.into();
        }
        reply(output, self.info.extra_info())
    }

    /// `[offset, length]`, truncated at the end of the descriptor.
    fn read_board_info(&mut self, input: &[u8], output: &mut [u8]) -> CmdResult {
        let &[offset, len] = input else {
            return Status::InvalidArguments.into();
        };
        let len = usize::from(len);
        if len > output.len() {
            return Status::InvalidArguments.into();
        }
        let copied = self.info.read(usize::from(offset), &mut output[..len]);
        CmdResult::ok(copied as u8)
    }

    fn get_num_children(&mut self, input: &[u8], output: &mut [u8]) -> CmdResult {
        let count = self.children.count();
        if count == 0 {
            return Status::NotSupported.into();
        }
        if !input.is_empty() {
            return Status::InvalidArguments.into();
        }
        reply(output, &[count])
    }

    /// `[child index, selected (0 or 1)]`
    fn set_child_select(&mut self, input: &[u8]) -> CmdResult {
        let count = self.children.count();
        if count == 0 {
            return Status::NotSupported.into();
        }
        let &[index, state] = input else {
            return Status::InvalidArguments.into();
        };
        let selected = match state {
            0 => false,
            1 => true,
            _ => return Status::InvalidArguments.into(),
        };
        if index >= count {
            return Status::InvalidArguments.into();
        }

        match self.children.select(index, selected) {
            Ok(()) => CmdResult::ok(0),
            Err(SelectError::NoSuchChild) => Status::InvalidArguments.into(),
            Err(err) => {
                log!(self.logger, Level::Error, "child {} select failed: {:?}", index, err);
                Status::Failed.into()
            }
        }
    }

    fn flash_failed(&mut self, err: FlashError, output: &mut [u8]) -> CmdResult {
        log!(self.logger, Level::Error, "flash error {:?}", err);
        match output.first_mut() {
            Some(code) => {
                *code = err.code();
                CmdResult::new(Status::Failed, 1)
            }
            None => Status::Failed.into(),
        }
    }

    fn log_progress(&mut self, progress: Progress) {
        if progress.written > 0 {
            log!(self.logger, Level::Info, "{} blocks written", progress.written);
        }
        if progress.unchanged > 0 {
            log!(self.logger, Level::Info, "{} blocks unchanged", progress.unchanged);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoardConfig;
    use crate::drivers::board_info::BOARD_INFO_SIZE;
    use crate::drivers::self_program::{FlashLayout, SelfProgram};
    use crate::hal::gpio::{NoChildren, PinChildSelect};
    use crate::logger::Logger;
    use crate::protocol::crc::crc8;
    use crate::protocol::transport::Framing;
    use crate::testing::Tiny841Flash;
    use embedded_hal_mock::pin::{Mock, State, Transaction};

    type Session<C> = Bootloader<Tiny841Flash, C, String, 64>;

    fn board_info() -> [u8; BOARD_INFO_SIZE] {
        let mut raw = [0u8; BOARD_INFO_SIZE];
        raw[..4].copy_from_slice(b"BDIF");
        raw[4] = 1;
        raw[5] = 4;
        raw[6] = 5;
        raw[12..16].copy_from_slice(&[0x00, 0x01, 0xe2, 0x40]);
        raw[16..].copy_from_slice(b"interface board\0");
        raw
    }

    fn session_with<C: ChildSelect>(children: C) -> Session<C> {
        let device = Tiny841Flash::with_contents(0x1fe0, &board_info());
        let flash = SelfProgram::new(device, FlashLayout::ATTINY841).unwrap();
        let logger = Logger::new(String::new(), Level::Debug);
        Bootloader::new(BoardConfig::INTERFACE_BOARD, flash, children, logger)
    }

    fn session() -> Session<NoChildren> {
        session_with(NoChildren)
    }

    /// Sends `[cmd, payload..]` to address 8 and returns status and payload.
    fn call<C: ChildSelect>(session: &mut Session<C>, cmd: u8, payload: &[u8]) -> Option<(u8, Vec<u8>)> {
        let mut buffer = [0u8; 32];
        buffer[0] = cmd;
        buffer[1..1 + payload.len()].copy_from_slice(payload);
        let len = 1 + payload.len();
        buffer[len] = crc8(&buffer[..len]);

        let reply_len = session.handle_frame(Framing::Crc8, 0x08, &mut buffer, len + 1, 32)?;
        assert_eq!(crc8(&buffer[..reply_len]), 0);
        assert_eq!(usize::from(buffer[1]) + 3, reply_len);
        Some((buffer[0], buffer[2..reply_len - 1].to_vec()))
    }

    #[test]
    fn protocol_version_wire_bytes() {
        let mut session = session();
        let mut buffer = [0u8; 32];
        buffer[..2].copy_from_slice(&[0x00, 0xf3]);
        let len = session.handle_frame(Framing::Crc8, 0x08, &mut buffer, 2, 32).unwrap();
        assert_eq!(&buffer[..len], &[0x00, 0x02, 0x01, 0x01, 0x15]);
    }

    #[test]
    fn hardware_info() {
        let mut session = session();
        let (status, payload) = call(&mut session, 0x03, &[]).unwrap();
        assert_eq!(status, Status::Ok as u8);
        assert_eq!(payload, vec![1, 4, BOOTLOADER_VERSION, 0x17, 0xfe]);
    }

    #[test]
    fn board_identity() {
        let mut session = session();
        assert_eq!(call(&mut session, 0x08, &[]), Some((0, vec![5])));
        assert_eq!(call(&mut session, 0x09, &[]), Some((0, vec![0x00, 0x01, 0xe2, 0x40])));
        assert_eq!(call(&mut session, 0x0c, &[]), Some((0, b"interface board\0".to_vec())));
        assert_eq!(call(&mut session, 0x0d, &[0, 4]), Some((0, b"BDIF".to_vec())));
        assert_eq!(call(&mut session, 0x0d, &[30, 8]), Some((0, b"d\0".to_vec())));
        assert_eq!(call(&mut session, 0x0d, &[40, 8]), Some((0, vec![])));
        assert_eq!(call(&mut session, 0x0d, &[0, 30]), Some((Status::InvalidArguments as u8, vec![])));
    }

    #[test]
    fn wrong_payload_length_is_invalid_arguments() {
        let mut session = session();
        for (cmd, payload) in [
            (0x00u8, &[1u8][..]),
            (0x01, &[0x20][..]),
            (0x03, &[0][..]),
            (0x04, &[0][..]),
            (0x05, &[0][..]),
            (0x06, &[0][..]),
            (0x07, &[0, 0][..]),
            (0x0d, &[0][..]),
        ] {
            let (status, _) = call(&mut session, cmd, payload).unwrap();
            assert_eq!(status, Status::InvalidArguments as u8, "command {}", cmd);
        }
        assert_eq!(session.exit_requested(), None);
    }

    #[test]
    fn unknown_and_reserved_commands_are_not_supported() {
        let mut session = session();
        assert_eq!(call(&mut session, 0x02, &[]), Some((Status::NotSupported as u8, vec![])));
        assert_eq!(call(&mut session, 0x42, &[]), Some((Status::NotSupported as u8, vec![])));
        assert_eq!(call(&mut session, 0x0a, &[]), Some((Status::NotSupported as u8, vec![])));
        assert_eq!(call(&mut session, 0x0b, &[0, 1]), Some((Status::NotSupported as u8, vec![])));
    }

    #[test]
    fn set_address_filters_on_hardware_type() {
        let mut session = session();
        assert_eq!(call(&mut session, 0x01, &[0x20, 2]), None);
        assert_eq!(session.address_filter().assigned(), None);

        assert_eq!(call(&mut session, 0x01, &[0x00, 1]), Some((Status::InvalidArguments as u8, vec![])));
        assert_eq!(call(&mut session, 0x01, &[0x80, 0]), Some((Status::InvalidArguments as u8, vec![])));

        assert_eq!(call(&mut session, 0x01, &[0x20, 1]), Some((0, vec![])));
        assert_eq!(session.address_filter().assigned(), Some(0x20));
        assert!(session.address_filter().matches(0x20));
        assert!(!session.address_filter().matches(0x08));
    }

    #[test]
    fn general_calls() {
        let mut session = session();
        call(&mut session, 0x01, &[0x33, 0]).unwrap();

        let mut buffer = [0x04, 0, 0, 0];
        assert_eq!(session.handle_frame(Framing::Crc8, 0x00, &mut buffer, 1, 32), None);
        assert_eq!(session.address_filter().assigned(), None);
        assert!(session.address_filter().matches(0x0f));

        let mut buffer = [0x06, 0, 0, 0];
        assert_eq!(session.handle_frame(Framing::Crc8, 0x00, &mut buffer, 1, 32), None);
        assert_eq!(session.exit_requested(), Some(SessionExit::Reset));
    }

    #[test]
    fn start_application_replies_then_exits() {
        let mut session = session();
        assert_eq!(call(&mut session, 0x04, &[]), Some((0, vec![])));
        assert_eq!(session.exit_requested(), Some(SessionExit::StartApplication));
    }

    #[test]
    fn read_flash_bounds() {
        let mut session = session();
        assert_eq!(call(&mut session, 0x07, &[0x1f, 0xe0, 4]), Some((0, b"BDIF".to_vec())));
        assert_eq!(call(&mut session, 0x07, &[0xff, 0xfe, 4]), Some((Status::InvalidArguments as u8, vec![])));
        assert_eq!(call(&mut session, 0x07, &[0x00, 0x00, 30]), Some((Status::InvalidArguments as u8, vec![])));
        let (status, payload) = call(&mut session, 0x07, &[0x00, 0x00, 29]).unwrap();
        assert_eq!(status, 0);
        assert_eq!(payload, vec![0xff; 29]);
    }

    #[test]
    fn bad_reset_vector_fails_with_code() {
        let mut session = session();
        let mut payload = vec![0x00, 0x00];
        payload.extend_from_slice(&[0x0c, 0x94]);
        payload.extend_from_slice(&[0u8; 14]);
        for offset in (0..64).step_by(16) {
            payload[0] = 0;
            payload[1] = offset as u8;
            if offset > 0 {
                payload[2..].fill(0);
            }
            let expected = if offset == 48 {
                (Status::Failed as u8, vec![FlashError::UnsupportedVector.code()])
            } else {
                (0, vec![])
            };
            assert_eq!(call(&mut session, 0x05, &payload), Some(expected));
        }
        assert!(session.logger().sink().contains("flash error UnsupportedVector"));
    }

    #[test]
    fn child_select_drives_pins() {
        let pin = Mock::new(&[
            Transaction::set(State::Low),
            Transaction::set(State::High),
            Transaction::set(State::Low),
        ]);
        let mut probe = pin.clone();
        let children = PinChildSelect::new([pin]).unwrap();
        let mut session = session_with(children);

        assert_eq!(call(&mut session, 0x0a, &[]), Some((0, vec![1])));
        assert_eq!(call(&mut session, 0x0b, &[0, 1]), Some((0, vec![])));
        assert_eq!(call(&mut session, 0x0b, &[0, 2]), Some((Status::InvalidArguments as u8, vec![])));
        assert_eq!(call(&mut session, 0x0b, &[1, 1]), Some((Status::InvalidArguments as u8, vec![])));
        assert_eq!(call(&mut session, 0x0b, &[0, 0]), Some((0, vec![])));
        probe.done();
    }
}
