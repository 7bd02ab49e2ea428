//! Bus protocol: status codes, command set and frame handling

pub mod crc;
pub mod packet;
pub mod transport;

use ufmt::derive::uDebug;

/// Status byte leading every reply.
#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    Failed = 0x01,
    NotSupported = 0x02,
    InvalidTransfer = 0x03,
    InvalidCrc = 0x04,
    InvalidArguments = 0x05,
    /// Never sent. Suppresses the reply altogether.
    NoReply = 0xff,
}

#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    GetProtocolVersion = 0x00,
    SetAddress = 0x01,
    PowerUpDisplay = 0x02,
    GetHardwareInfo = 0x03,
    StartApplication = 0x04,
    WriteFlash = 0x05,
    FinalizeFlash = 0x06,
    ReadFlash = 0x07,
    GetHardwareRevision = 0x08,
    GetSerialNumber = 0x09,
    GetNumChildren = 0x0a,
    SetChildSelect = 0x0b,
    GetExtraInfo = 0x0c,
    ReadBoardInfo = 0x0d,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(byte: u8) -> core::result::Result<Self, u8> {
        match byte {
            0x00 => Ok(Command::GetProtocolVersion),
            0x01 => Ok(Command::SetAddress),
            0x02 => Ok(Command::PowerUpDisplay),
            0x03 => Ok(Command::GetHardwareInfo),
            0x04 => Ok(Command::StartApplication),
            0x05 => Ok(Command::WriteFlash),
            0x06 => Ok(Command::FinalizeFlash),
            0x07 => Ok(Command::ReadFlash),
            0x08 => Ok(Command::GetHardwareRevision),
            0x09 => Ok(Command::GetSerialNumber),
            0x0a => Ok(Command::GetNumChildren),
            0x0b => Ok(Command::SetChildSelect),
            0x0c => Ok(Command::GetExtraInfo),
            0x0d => Ok(Command::ReadBoardInfo),
            other => Err(other),
        }
    }
}

/// Out-of-band commands carried on the general call address.
#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GeneralCallCommand {
    ResetAddress = 0x04,
    Reset = 0x06,
}

impl GeneralCallCommand {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x04 => Some(GeneralCallCommand::ResetAddress),
            0x06 => Some(GeneralCallCommand::Reset),
            _ => None,
        }
    }
}

/// Outcome of a single command: reply status plus the number of payload
/// bytes the command wrote into its output buffer.
#[derive(Debug, uDebug, Clone, Copy, PartialEq, Eq)]
pub struct CmdResult {
    pub status: Status,
    pub len: u8,
}

impl CmdResult {
    pub const NO_REPLY: CmdResult = CmdResult::new(Status::NoReply, 0);

    pub const fn new(status: Status, len: u8) -> Self {
        Self { status, len }
    }

    pub const fn ok(len: u8) -> Self {
        Self::new(Status::Ok, len)
    }
}

impl From<Status> for CmdResult {
    fn from(status: Status) -> Self {
        Self::new(status, 0)
    }
}
