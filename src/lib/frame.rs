//! Request encoding and response decoding for the keypad wire protocol.
//!
//! Requests are `STX OPCODE PARAM* ETX`. Responses echo the request header
//! and end at the first `ETX` byte; there is no length field and no escaping,
//! so a payload can never carry `0xFF`.

use num_derive::FromPrimitive;
use thiserror::Error;

use crate::ops::DeviceProfile;

pub const STX: u8 = 0xEE;
pub const ETX: u8 = 0xFF;

/// Bytes before the key codes in a read response.
pub const READ_HEADER_LEN: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Read = 0x00,
    Write = 0x01,
    Query = 0x02,
}

#[derive(Error, Debug, PartialEq)]
pub enum FrameError {
    #[error("short response frame ({len} bytes, need at least {need})")]
    ShortFrame { len: usize, need: usize },
    #[error("response frame is not terminated")]
    Unterminated,
}

pub fn encode_request(opcode: Opcode, params: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(params.len() + 3);
    frame.push(STX);
    frame.push(opcode as u8);
    frame.extend_from_slice(params);
    frame.push(ETX);
    frame
}

pub fn query_request() -> Vec<u8> {
    encode_request(Opcode::Query, &[])
}

pub fn read_request(switch: u8) -> Vec<u8> {
    encode_request(Opcode::Read, &[switch])
}

pub fn write_request(switch: u8, codes: &[u8]) -> Vec<u8> {
    let mut params = Vec::with_capacity(codes.len() + 1);
    params.push(switch);
    params.extend_from_slice(codes);
    encode_request(Opcode::Write, &params)
}

fn check_terminated(frame: &[u8]) -> Result<(), FrameError> {
    match frame.last() {
        Some(&ETX) => Ok(()),
        _ => Err(FrameError::Unterminated),
    }
}

/// Switch count and key limit sit at offsets 2 and 3 of the query response.
pub fn decode_profile(frame: &[u8]) -> Result<DeviceProfile, FrameError> {
    check_terminated(frame)?;
    if frame.len() < 4 {
        return Err(FrameError::ShortFrame {
            len: frame.len(),
            need: 4,
        });
    }

    Ok(DeviceProfile {
        switch_count: frame[2],
        max_keys: frame[3],
    })
}

/// Key codes of a read response, without the echoed header and the terminator.
pub fn switch_payload(frame: &[u8]) -> Result<&[u8], FrameError> {
    check_terminated(frame)?;
    if frame.len() < READ_HEADER_LEN + 1 {
        return Err(FrameError::ShortFrame {
            len: frame.len(),
            need: READ_HEADER_LEN + 1,
        });
    }

    Ok(&frame[READ_HEADER_LEN..frame.len() - 1])
}
