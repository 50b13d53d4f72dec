//! Device side of the bus: an emulated mat.
//!
//! [`MatEmulator`] answers the controller the way the mat firmware does. It
//! is used to exercise the controller without hardware.
//!
//! # Example
//!
//! ```
//! use cubby_bus::command::poll_weight;
//! use cubby_bus::device::MatEmulator;
//! use cubby_bus::frame::decode;
//! use cubby_bus::{addr, McuFamily, Opcode};
//!
//! let mut mat = MatEmulator::new(addr(0x0201), McuFamily::Holtek, 0x00AB_CDEF);
//! mat.adc = [1, 2, 3, 4];
//! let reply = mat.receive_data(&poll_weight(addr(0x0201)).unwrap()).unwrap();
//! let frame = decode(&reply).unwrap();
//! assert_eq!(frame.opcode(), Some(Opcode::Weight));
//! assert_eq!(frame.source, addr(0x0201));
//! ```

use log::{debug, info, trace};

use crate::buffer::Buffer;
use crate::frame::{decode, encode_reply, Frame, FrameBytes, CMD_REQUEST};
use crate::nom_parser::{split_frame, SplitToken};
use crate::registry::CUBBY_COUNT;
use crate::types::{DeviceAddress, McuFamily, Opcode};

/// ADC readings are 24 bits on the wire.
const ADC_MASK: u32 = 0x00FF_FFFF;

#[derive(Debug)]
pub struct MatEmulator {
    address: DeviceAddress,
    family: McuFamily,
    /// Hardware id reported on an id request.
    id: u32,
    /// Raw readings reported on the next weight poll.
    pub adc: [u32; CUBBY_COUNT],
    leds: u8,
    lcd: Option<Frame>,
    input_buffer: Buffer,
}

impl MatEmulator {
    pub fn new(address: DeviceAddress, family: McuFamily, id: u32) -> Self {
        Self {
            address,
            family,
            id: id & ADC_MASK,
            adc: [0; CUBBY_COUNT],
            leds: 0,
            lcd: None,
            input_buffer: Buffer::new(),
        }
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// The last LED mask received.
    pub fn leds(&self) -> u8 {
        self.leds
    }

    /// The last LCD command addressed to this device.
    pub fn last_lcd(&self) -> Option<&Frame> {
        self.lcd.as_ref()
    }

    /// Feed bytes from the bus. Returns the reply to send, if any.
    ///
    /// The bus is half-duplex, so at most one request is outstanding and
    /// only the reply to the last complete frame is returned.
    pub fn receive_data(&mut self, data: &[u8]) -> Option<FrameBytes> {
        self.input_buffer.write(data);
        let mut reply = None;
        loop {
            let (consumed, frame) = match split_frame(self.input_buffer.as_ref()) {
                (_, SplitToken::NeedData) => break,
                (consumed, SplitToken::Skip) => (consumed, None),
                (consumed, SplitToken::Candidate(bytes)) => match decode(bytes) {
                    Some(frame) => (consumed, Some(frame)),
                    None => (1, None),
                },
            };
            self.input_buffer.consume(consumed);
            if let Some(frame) = frame {
                reply = self.handle(&frame);
            }
        }
        reply
    }

    /// Discard a partially received frame.
    pub fn clear_input(&mut self) {
        self.input_buffer.clear();
    }

    /// React to one frame from the controller.
    pub fn handle(&mut self, frame: &Frame) -> Option<FrameBytes> {
        if frame.cmd_type != CMD_REQUEST {
            // another device answering
            return None;
        }
        trace!("{:#06X} got {:?}", *self.address, frame);
        match frame.opcode()? {
            Opcode::Identity(family) if family == self.family => {
                if frame.target.is_assigned() {
                    return None;
                }
                if let [hi, lo, ..] = frame.payload[..] {
                    self.address = DeviceAddress::from_bytes(hi, lo);
                    info!("address set to {:#06X}", *self.address);
                    None
                } else {
                    let id = self.id.to_be_bytes();
                    encode_reply(frame.opcode()?, self.address, &id[1..]).ok()
                }
            }
            _ if frame.target != self.address => None,
            Opcode::Weight => {
                let mut payload = [0u8; 3 * CUBBY_COUNT];
                for (chunk, raw) in payload.chunks_exact_mut(3).zip(self.adc.iter()) {
                    chunk.copy_from_slice(&(raw & ADC_MASK).to_be_bytes()[1..]);
                }
                encode_reply(Opcode::Weight, self.address, &payload).ok()
            }
            Opcode::Led => {
                if let Some(mask) = frame.payload.first() {
                    self.leds = *mask;
                }
                None
            }
            Opcode::Lcd(kind) => {
                debug!("{:#06X} display update {:?}", *self.address, kind);
                self.lcd = Some(frame.clone());
                None
            }
            Opcode::Identity(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{self, LcdCommand};
    use crate::dispatch::{dispatch, Dispatch};
    use crate::registry::DeviceRegistry;
    use crate::types::{addr, lcd_slot, DisplayKind};

    fn mat() -> MatEmulator {
        MatEmulator::new(addr(0x0201), McuFamily::Holtek, 0x0012_3456)
    }

    #[test]
    fn test_weight_reply() {
        let mut mat = mat();
        mat.adc = [1100, 0x80000, 0x1FF_FFFF, 0];
        let reply = mat
            .receive_data(&command::poll_weight(addr(0x0201)).unwrap())
            .unwrap();

        let mut reg = DeviceRegistry::new();
        let _ = reg.set_mat_identity(0, addr(0x0201));
        let frame = decode(&reply).unwrap();
        assert_eq!(dispatch(&mut reg, &frame), Dispatch::WeightUpdated { mat: 0 });
        let cubbies = &reg.mat(0).unwrap().cubbies;
        assert_eq!(cubbies[0].adc_raw, 1100);
        assert_eq!(cubbies[2].adc_raw, 0xFF_FFFF);
    }

    #[test]
    fn test_other_targets_ignored() {
        let mut mat = mat();
        assert_eq!(
            mat.receive_data(&command::poll_weight(addr(0x0202)).unwrap()),
            None
        );
        assert_eq!(
            mat.receive_data(&command::set_led(addr(0x0202), 0xFF).unwrap()),
            None
        );
        assert_eq!(mat.leds(), 0);
        // replies of other mats
        let reply = encode_reply(Opcode::Weight, addr(0x0201), &[0; 12]).unwrap();
        assert_eq!(mat.receive_data(&reply), None);
    }

    #[test]
    fn test_identity() {
        let mut mat = mat();
        let reply = mat
            .receive_data(&command::request_id(McuFamily::Holtek).unwrap())
            .unwrap();
        let mut reg = DeviceRegistry::new();
        assert_eq!(
            dispatch(&mut reg, &decode(&reply).unwrap()),
            Dispatch::IdCaptured(0x12_3456)
        );

        // STM32 commands are for another kind of device
        assert_eq!(
            mat.receive_data(&command::request_id(McuFamily::Stm32).unwrap()),
            None
        );

        let set = command::assign_id(McuFamily::Holtek, addr(0x0305)).unwrap();
        assert_eq!(mat.receive_data(&set), None);
        assert_eq!(mat.address(), addr(0x0305));
        assert!(mat
            .receive_data(&command::poll_weight(addr(0x0305)).unwrap())
            .is_some());
    }

    #[test]
    fn test_led_and_lcd() {
        let mut mat = mat();
        mat.receive_data(&command::set_led(addr(0x0201), 0xF5).unwrap());
        assert_eq!(mat.leds(), 0xF5);

        let flags = LcdCommand::ModeFlags {
            slot: lcd_slot(1),
            highlight: true,
            background: true,
        };
        assert_eq!(
            mat.receive_data(&command::lcd(addr(0x0201), &flags).unwrap()),
            None
        );
        assert_eq!(
            mat.last_lcd().unwrap().opcode(),
            Some(Opcode::Lcd(DisplayKind::ModeFlags))
        );
    }

    #[test]
    fn test_split_request() {
        let mut mat = mat();
        let poll = command::poll_weight(addr(0x0201)).unwrap();
        assert_eq!(mat.receive_data(&poll[..5]), None);
        assert!(mat.receive_data(&poll[5..]).is_some());

        assert_eq!(mat.receive_data(&poll[..5]), None);
        mat.clear_input();
        assert_eq!(mat.receive_data(&poll[5..]), None);
    }
}
