//! Frame encoding and decoding.
//!
//! Every frame on the bus has the layout
//!
//! ```text
//! 0x55 | length | type | host hi | host lo | device hi | device lo | reserved (4)
//!      | opcode | cmd type | payload len | payload ... | checksum hi | checksum lo
//! ```
//!
//! where `length` is the total number of bytes in the frame and the checksum is
//! [`sum16`](crate::sum16) over everything before it. Frames sent by the
//! controller have host address 0 and the target device in the device field;
//! replies carry the answering device's address in the host field.

use arrayvec::ArrayVec;
use log::{debug, trace};
use snafu::{ensure, Snafu};

use crate::nom_parser;
use crate::types::{DeviceAddress, Opcode};
use crate::{sum16, PREFIX};

/// Bytes before the payload.
pub const HEADER_LEN: usize = 14;
pub const CHECKSUM_LEN: usize = 2;
/// A frame without payload.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + CHECKSUM_LEN;
/// The length field is a single byte.
pub const MAX_FRAME_LEN: usize = 255;
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - MIN_FRAME_LEN;

pub type FrameBytes = ArrayVec<u8, MAX_FRAME_LEN>;
pub type Payload = ArrayVec<u8, MAX_PAYLOAD_LEN>;

/// Frame type byte, the only one in use on the bus.
pub const KIND_DATA: u8 = 0x01;
/// `cmd type` of frames sent by the controller.
pub const CMD_REQUEST: u8 = 0x00;
/// `cmd type` of frames sent by devices.
pub const CMD_REPLY: u8 = 0x01;

/// Error type for this module
#[derive(Debug, Snafu, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The payload doesn't fit in a single frame.
    #[snafu(display("Payload of {} bytes exceeds {} bytes", len, MAX_PAYLOAD_LEN))]
    PayloadTooLong { len: usize },
}

/// Typed view of a validated frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    /// Host address field, bytes 3-4. Holds the sender on device replies.
    pub source: DeviceAddress,
    /// Device address field, bytes 5-6.
    pub target: DeviceAddress,
    pub opcode: u8,
    pub cmd_type: u8,
    pub payload: Payload,
}

impl Frame {
    /// A command from the controller to `target`.
    /// # Errors
    /// Returns [`Error::PayloadTooLong`] if `payload` can't fit in one frame.
    pub fn request(
        opcode: Opcode,
        target: DeviceAddress,
        payload: &[u8],
    ) -> Result<Self, Error> {
        Self::build(opcode, DeviceAddress::UNASSIGNED, target, CMD_REQUEST, payload)
    }

    /// A reply from the device at `source` to the controller.
    /// # Errors
    /// Returns [`Error::PayloadTooLong`] if `payload` can't fit in one frame.
    pub fn reply(opcode: Opcode, source: DeviceAddress, payload: &[u8]) -> Result<Self, Error> {
        Self::build(opcode, source, DeviceAddress::UNASSIGNED, CMD_REPLY, payload)
    }

    fn build(
        opcode: Opcode,
        source: DeviceAddress,
        target: DeviceAddress,
        cmd_type: u8,
        payload: &[u8],
    ) -> Result<Self, Error> {
        ensure!(
            payload.len() <= MAX_PAYLOAD_LEN,
            PayloadTooLongSnafu { len: payload.len() }
        );
        let mut buf = Payload::new();
        buf.extend(payload.iter().copied());
        Ok(Self {
            kind: KIND_DATA,
            source,
            target,
            opcode: opcode.to_byte(),
            cmd_type,
            payload: buf,
        })
    }

    /// The opcode, or `None` if the byte isn't one we know.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_byte(self.opcode)
    }

    /// Total length of the frame on the wire.
    pub fn wire_len(&self) -> usize {
        MIN_FRAME_LEN + self.payload.len()
    }

    /// Serialize to the on-wire representation, including the checksum.
    pub fn to_bytes(&self) -> FrameBytes {
        let mut data = FrameBytes::new();
        data.push(PREFIX);
        data.push(self.wire_len() as u8);
        data.push(self.kind);
        data.extend(self.source.to_bytes());
        data.extend(self.target.to_bytes());
        data.extend([0u8; 4]);
        data.push(self.opcode);
        data.push(self.cmd_type);
        data.push(self.payload.len() as u8);
        data.extend(self.payload.iter().copied());
        let checksum = sum16(&data);
        data.extend(checksum.to_be_bytes());
        data
    }
}

/// Build the bytes of a controller command to `device`.
/// # Errors
/// Returns [`Error::PayloadTooLong`] if `payload` can't fit in one frame.
pub fn encode(opcode: Opcode, device: DeviceAddress, payload: &[u8]) -> Result<FrameBytes, Error> {
    let bytes = Frame::request(opcode, device, payload)?.to_bytes();
    trace!("encoded {:02X?}", bytes.as_slice());
    Ok(bytes)
}

/// Build the bytes of a reply from the device at `source`.
/// # Errors
/// Returns [`Error::PayloadTooLong`] if `payload` can't fit in one frame.
pub fn encode_reply(
    opcode: Opcode,
    source: DeviceAddress,
    payload: &[u8],
) -> Result<FrameBytes, Error> {
    Ok(Frame::reply(opcode, source, payload)?.to_bytes())
}

/// Validate and decode one complete frame.
///
/// Returns `None` if the prefix, length byte, checksum or payload length
/// don't match. Rejected frames are dropped without a reply, the bus is
/// expected to be noisy.
pub fn decode(bytes: &[u8]) -> Option<Frame> {
    if bytes.len() < CHECKSUM_LEN || usize::from(bytes[1]) != bytes.len() || bytes[0] != PREFIX {
        debug!("dropping frame with bad framing {:02X?}", bytes);
        return None;
    }
    let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if sum16(body) != u16::from_be_bytes([checksum[0], checksum[1]]) {
        debug!("dropping frame with bad checksum {:02X?}", bytes);
        return None;
    }
    match nom_parser::frame_body(body) {
        Ok((_, frame)) => Some(frame),
        Err(_) => {
            debug!("dropping frame with inconsistent payload length {:02X?}", bytes);
            None
        }
    }
}
