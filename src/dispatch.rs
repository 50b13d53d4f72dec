//! Interpretation of validated frames.
//!
//! [`dispatch`] never sends anything. Whatever follow-up traffic a frame
//! calls for is decided by the scheduler from the returned [`Dispatch`].

use arrayvec::ArrayVec;
use log::{debug, info, trace};

use crate::frame::{Frame, KIND_DATA};
use crate::registry::{Device, DeviceRegistry, CUP_COUNT};
use crate::types::Opcode;

/// Bytes per ADC reading in a weight reply.
const READING_LEN: usize = 3;

/// What a frame did to the registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// An identity reply, the id is now the captured id.
    IdCaptured(u32),
    /// Fresh readings for the mat at this table index.
    WeightUpdated { mat: usize },
    /// Fresh readings for the box at this table index.
    BoxWeightUpdated { cup_box: usize },
    /// A weight reply from an address that isn't in the registry.
    UnknownDevice,
    /// Not a data frame, or the payload is too short for the opcode.
    Malformed,
    /// A known opcode that needs no action from the controller.
    Ignored(Opcode),
    /// An opcode this controller doesn't know.
    Unknown(u8),
}

fn be_u24(bytes: &[u8]) -> u32 {
    (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
}

/// Apply a validated frame to the registry.
pub fn dispatch(registry: &mut DeviceRegistry, frame: &Frame) -> Dispatch {
    trace!("dispatching {:?}", frame);
    if frame.kind != KIND_DATA {
        debug!("dropping frame of type {:#04X}", frame.kind);
        return Dispatch::Malformed;
    }
    match frame.opcode() {
        Some(Opcode::Identity(family)) => {
            if frame.payload.len() < READING_LEN {
                return Dispatch::Malformed;
            }
            let id = be_u24(&frame.payload);
            info!("{:?} device reported id {:#08X}", family, id);
            registry.capture_id(id);
            Dispatch::IdCaptured(id)
        }
        Some(Opcode::Weight) => weight_reply(registry, frame),
        Some(op @ Opcode::Led) | Some(op @ Opcode::Lcd(_)) => Dispatch::Ignored(op),
        None => {
            debug!("ignoring unknown opcode {:#04X}", frame.opcode);
            Dispatch::Unknown(frame.opcode)
        }
    }
}

fn weight_reply(registry: &mut DeviceRegistry, frame: &Frame) -> Dispatch {
    let readings: ArrayVec<u32, CUP_COUNT> = frame
        .payload
        .chunks_exact(READING_LEN)
        .take(CUP_COUNT)
        .map(be_u24)
        .collect();

    if let Some(mat) = registry.find_mat(frame.source) {
        if readings.len() < crate::registry::CUBBY_COUNT {
            debug!("short weight reply from {:#06X}", *frame.source);
            return Dispatch::Malformed;
        }
        let _ = registry.record_readings(Device::Mat(mat), &readings);
        trace!("mat {} readings {:?}", mat, readings);
        Dispatch::WeightUpdated { mat }
    } else if let Some(cup_box) = registry.find_box(frame.source) {
        if readings.is_empty() {
            return Dispatch::Malformed;
        }
        let _ = registry.record_readings(Device::Box(cup_box), &readings);
        Dispatch::BoxWeightUpdated { cup_box }
    } else {
        debug!("weight reply from unknown device {:#06X}", *frame.source);
        Dispatch::UnknownDevice
    }
}
