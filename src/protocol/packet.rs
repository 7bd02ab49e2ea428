//! Request/reply framing around the command processor
//!
//! Request:  `[cmd, payload.., crc]`
//! Reply:    `[status, len, payload.., crc]`
//!
//! With CRC-16 framing the checksum also covers the destination address
//! and is stored low byte first.

use super::transport::Framing;
use super::{CmdResult, Status};
use crate::config::{GENERAL_CALL_ADDRESS, MAX_PACKET_LENGTH};

/// Consumer of validated frames.
pub trait CommandProcessor {
    /// Runs `cmd` with its payload, writing reply payload into `output`.
    fn process(&mut self, cmd: u8, input: &[u8], output: &mut [u8]) -> CmdResult;

    /// Handles a frame sent to the general call address. Never replied to.
    fn general_call(&mut self, cmd: u8);
}

/// Validates the frame in `buffer[..len]`, runs it through `processor` and
/// builds the reply in place.
///
/// Returns the reply length, or `None` when nothing must be sent. The reply
/// never exceeds `max_reply` bytes.
pub fn deliver<P>(
    processor: &mut P,
    framing: Framing,
    address: u8,
    buffer: &mut [u8],
    len: usize,
    max_reply: usize,
) -> Option<usize>
where
    P: CommandProcessor + ?Sized,
{
    let len = len.min(buffer.len());

    if address == GENERAL_CALL_ADDRESS {
        if let Some(&cmd) = buffer[..len].first() {
            processor.general_call(cmd);
        }
        return None;
    }

    let max_reply = max_reply.min(buffer.len());
    let overhead = framing.overhead();
    if max_reply < overhead {
        return None;
    }

    let crc_len = framing.crc_len();
    let (status, payload_len) = if len < 1 + crc_len {
        (Status::InvalidTransfer, 0)
    } else if !framing.check(address, &buffer[..len]) {
        if framing.drops_bad_crc() {
            return None;
        }
        (Status::InvalidCrc, 0)
    } else {
        let cmd = buffer[0];
        let input_len = len - 1 - crc_len;
        if input_len > MAX_PACKET_LENGTH {
            (Status::InvalidTransfer, 0)
        } else {
            // the reply is assembled over the request
            let mut input = [0u8; MAX_PACKET_LENGTH];
            input[..input_len].copy_from_slice(&buffer[1..1 + input_len]);

            let capacity = max_reply - overhead;
            let result = processor.process(cmd, &input[..input_len], &mut buffer[2..2 + capacity]);
            if result.status == Status::NoReply {
                return None;
            }
            debug_assert!(result.len as usize <= capacity);
            (result.status, (result.len as usize).min(capacity))
        }
    };

    buffer[0] = status as u8;
    buffer[1] = payload_len as u8;
    Some(framing.seal(address, buffer, 2 + payload_len))
}

/// Reply payload helper: copies `bytes` into `output` when they fit.
pub fn reply(output: &mut [u8], bytes: &[u8]) -> CmdResult {
    match output.get_mut(..bytes.len()) {
        Some(dst) => {
            dst.copy_from_slice(bytes);
            CmdResult::ok(bytes.len() as u8)
        }
        None => Status::InvalidTransfer.into(),
    }
}
