// src/common/frame.rs

//! Wire framing for the LLS request/response protocol.
//!
//! ```text
//! request:   [address][command][payload: 0..N][crc lo][crc hi]
//! response:  [address][command][count?][data: fixed][crc lo][crc hi]
//! exception: [address][command | 0x80][exception code][crc lo][crc hi]
//! ```

use super::address::SensorAddress;
use super::command::{Command, EXCEPTION_FLAG};
use super::crc::{self, CRC_LEN};
use super::error::{DecodingError, EncodingError};
use arrayvec::ArrayVec;

/// Largest data section any command carries.
pub const MAX_DATA_LEN: usize = 4;

/// Largest frame in either direction, checksum included.
pub const MAX_FRAME_LEN: usize = 2 + 1 + MAX_DATA_LEN + CRC_LEN;

/// Length of an exception response.
pub const EXCEPTION_FRAME_LEN: usize = 5;

/// No response, valid or exceptional, is shorter than this.
pub const MIN_RESPONSE_LEN: usize = 5;

/// Raw frame bytes, checksum included.
pub type FrameBytes = ArrayVec<u8, MAX_FRAME_LEN>;

/// An encoded request, ready to be written to the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    address: SensorAddress,
    command: Command,
    bytes: FrameBytes,
}

impl RequestFrame {
    #[inline]
    pub fn address(&self) -> SensorAddress {
        self.address
    }

    #[inline]
    pub fn command(&self) -> Command {
        self.command
    }

    /// The complete frame as sent on the wire.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[2..self.bytes.len() - CRC_LEN]
    }

    pub fn crc(&self) -> u16 {
        crc::decode_crc(&self.bytes[self.bytes.len() - CRC_LEN..])
    }
}

/// A response that passed address, command, length and checksum checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    address: SensorAddress,
    command: Command,
    data: ArrayVec<u8, MAX_DATA_LEN>,
    crc: u16,
}

impl ResponseFrame {
    #[inline]
    pub fn address(&self) -> SensorAddress {
        self.address
    }

    #[inline]
    pub fn command(&self) -> Command {
        self.command
    }

    /// Data bytes, without the byte-count field or checksum.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn crc(&self) -> u16 {
        self.crc
    }
}

/// Outcome of a successful decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub frame: ResponseFrame,
    /// Bytes of the buffer that belonged to the frame. Anything after them is noise.
    pub consumed: usize,
}

/// Builds a request frame and appends its checksum.
pub fn encode_request(
    address: SensorAddress,
    command: Command,
    payload: &[u8],
) -> Result<RequestFrame, EncodingError> {
    let schema = command.schema();
    if payload.len() != schema.request_len {
        return Err(EncodingError::PayloadLength {
            command,
            expected: schema.request_len,
            got: payload.len(),
        });
    }

    let mut bytes = FrameBytes::new();
    bytes.push(address.as_u8());
    bytes.push(schema.code);
    // Length checked against the schema above, which always fits.
    bytes.extend(payload.iter().copied());
    append_crc(&mut bytes);

    Ok(RequestFrame { address, command, bytes })
}

/// Builds the response a sensor sends for `command`.
///
/// Used by loopback fixtures and bus simulators.
pub fn encode_response(
    address: SensorAddress,
    command: Command,
    data: &[u8],
) -> Result<FrameBytes, EncodingError> {
    let schema = command.schema();
    if data.len() != schema.response_data_len {
        return Err(EncodingError::ResponseLength {
            command,
            expected: schema.response_data_len,
            got: data.len(),
        });
    }

    let mut bytes = FrameBytes::new();
    bytes.push(address.as_u8());
    bytes.push(schema.code);
    if schema.counted {
        bytes.push(data.len() as u8);
    }
    bytes.extend(data.iter().copied());
    append_crc(&mut bytes);
    Ok(bytes)
}

/// Builds an exception response for `command`.
pub fn encode_exception_response(address: SensorAddress, command: Command, code: u8) -> FrameBytes {
    let mut bytes = FrameBytes::new();
    bytes.push(address.as_u8());
    bytes.push(command.code() | EXCEPTION_FLAG);
    bytes.push(code);
    append_crc(&mut bytes);
    bytes
}

fn append_crc(bytes: &mut FrameBytes) {
    let crc = crc::calculate_crc16(bytes);
    bytes.extend(crc::encode_crc(crc));
}

/// Tries to decode the response to a `command` request sent to `address`
/// from the bytes accumulated since the last frame boundary.
///
/// Returns `DecodingError::Incomplete` while more bytes are needed. Checks
/// run in wire order: address, command echo, length, checksum, and only then
/// the declared byte count. Bytes after the frame are reported through
/// [`DecodedFrame::consumed`] and must be discarded by the caller.
pub fn try_decode_response(
    buffer: &[u8],
    address: SensorAddress,
    command: Command,
) -> Result<DecodedFrame, DecodingError> {
    if buffer.len() < MIN_RESPONSE_LEN {
        return Err(DecodingError::Incomplete {
            needed: MIN_RESPONSE_LEN,
            got: buffer.len(),
        });
    }

    let received_address = buffer[0];
    if received_address != address.as_u8() {
        return Err(DecodingError::AddressMismatch {
            expected: address.as_u8(),
            received: received_address,
        });
    }

    let schema = command.schema();
    let function = buffer[1];
    if function == schema.code | EXCEPTION_FLAG {
        let frame = &buffer[..EXCEPTION_FRAME_LEN];
        crc::verify_frame_crc(frame)?;
        return Err(DecodingError::SensorException(frame[2]));
    }
    if function != schema.code {
        return Err(DecodingError::UnexpectedCommand {
            expected: schema.code,
            received: function,
        });
    }

    let frame_len = command.response_frame_len();
    if buffer.len() < frame_len {
        return Err(DecodingError::Incomplete {
            needed: frame_len,
            got: buffer.len(),
        });
    }
    let frame = &buffer[..frame_len];
    crc::verify_frame_crc(frame)?;

    let mut data_start = 2;
    if schema.counted {
        let declared = frame[2];
        if declared as usize != schema.response_data_len {
            return Err(DecodingError::Malformed {
                declared,
                expected: schema.response_data_len as u8,
            });
        }
        data_start = 3;
    }

    let data_end = frame_len - CRC_LEN;
    let data = ArrayVec::try_from(&frame[data_start..data_end]).map_err(|_| DecodingError::Malformed {
        declared: (data_end - data_start) as u8,
        expected: schema.response_data_len as u8,
    })?;

    Ok(DecodedFrame {
        frame: ResponseFrame {
            address,
            command,
            data,
            crc: crc::decode_crc(&frame[data_end..]),
        },
        consumed: frame_len,
    })
}
