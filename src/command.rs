//! Builders for the commands the controller sends.
//!
//! Each builder returns the complete frame, ready to be written to the bus.

use arrayvec::ArrayVec;

use crate::frame::{encode, Error, FrameBytes, MAX_PAYLOAD_LEN};
use crate::registry::{Mat, CUBBY_COUNT};
use crate::types::{DeviceAddress, DisplayKind, LcdSlot, McuFamily, Opcode};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Ask a mat or box for its current ADC readings.
pub fn poll_weight(device: DeviceAddress) -> Result<FrameBytes> {
    encode(Opcode::Weight, device, &[])
}

/// Switch the cubby LEDs of a mat. Bits 3..0 drive LED4..LED1, bits 7..4
/// enable them.
pub fn set_led(mat: DeviceAddress, mask: u8) -> Result<FrameBytes> {
    encode(Opcode::Led, mat, &[mask])
}

/// Switch the cup LEDs of a box, one bit per cup.
pub fn set_box_led(cup_box: DeviceAddress, enable: u32, value: u32) -> Result<FrameBytes> {
    let mut payload = [0u8; 8];
    payload[..4].copy_from_slice(&enable.to_be_bytes());
    payload[4..].copy_from_slice(&value.to_be_bytes());
    encode(Opcode::Led, cup_box, &payload)
}

/// Give the single unassigned device on the bus a new address.
pub fn assign_id(family: McuFamily, new_id: DeviceAddress) -> Result<FrameBytes> {
    encode(
        family.identity_opcode(),
        DeviceAddress::UNASSIGNED,
        &new_id.to_bytes(),
    )
}

/// Ask the device on the bus for its id. The answer ends up in
/// [`DeviceRegistry::captured_id`](crate::registry::DeviceRegistry::captured_id).
pub fn request_id(family: McuFamily) -> Result<FrameBytes> {
    encode(family.identity_opcode(), DeviceAddress::UNASSIGNED, &[])
}

/// One of the four LCD commands.
#[derive(Debug, Clone, PartialEq)]
pub enum LcdCommand {
    /// Text written into the fixed-length field of a slot.
    FixedField { slot: LcdSlot, text: Vec<u8> },
    /// Weight strings, each prefixed with its length, starting at `slot`.
    WeightText { slot: LcdSlot, text: Vec<u8> },
    /// Quantity strings, each prefixed with its length, starting at `slot`.
    QuantityText { slot: LcdSlot, text: Vec<u8> },
    /// Highlight a slot and/or fill its background.
    ModeFlags {
        slot: LcdSlot,
        highlight: bool,
        background: bool,
    },
}

impl LcdCommand {
    pub fn kind(&self) -> DisplayKind {
        match self {
            LcdCommand::FixedField { .. } => DisplayKind::FixedField,
            LcdCommand::WeightText { .. } => DisplayKind::WeightText,
            LcdCommand::QuantityText { .. } => DisplayKind::QuantityText,
            LcdCommand::ModeFlags { .. } => DisplayKind::ModeFlags,
        }
    }

    fn payload(&self) -> Result<ArrayVec<u8, MAX_PAYLOAD_LEN>> {
        let mut data = ArrayVec::new();
        let mut push = |bytes: &[u8]| {
            let len = data.len() + bytes.len();
            data.try_extend_from_slice(bytes)
                .map_err(|_| Error::PayloadTooLong { len })
        };
        match self {
            LcdCommand::FixedField { slot, text } => {
                push(text.as_slice())?;
                push(&[**slot, 0])?;
            }
            LcdCommand::WeightText { slot, text } | LcdCommand::QuantityText { slot, text } => {
                push(&[**slot])?;
                push(text.as_slice())?;
                push(&[0])?;
            }
            LcdCommand::ModeFlags {
                slot,
                highlight,
                background,
            } => {
                let mask = slot.mask();
                push(&[
                    0,
                    mask,
                    if *highlight { mask } else { 0 },
                    0xFF,
                    if *background { 0xFF } else { 0 },
                ])?;
            }
        }
        Ok(data)
    }
}

/// Send an LCD command to the display at `lcd`.
pub fn lcd(lcd: DeviceAddress, command: &LcdCommand) -> Result<FrameBytes> {
    encode(Opcode::Lcd(command.kind()), lcd, &command.payload()?)
}

/// Which half of a display refresh is due.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DisplayPage {
    Weight,
    Quantity,
}

/// The display slot showing the first cubby of the mat at `index`. Two mats
/// share one display, the left one starts at slot 1 and the right one at 5.
pub fn mat_lcd_slot(index: usize) -> LcdSlot {
    if index % 2 == 0 {
        crate::types::lcd_slot(1)
    } else {
        crate::types::lcd_slot(1 + CUBBY_COUNT as u8)
    }
}

/// Refresh the weight or quantity text of a mat's display. Returns `None`
/// for mats without a display.
pub fn display_refresh(mat: &Mat, index: usize, page: DisplayPage) -> Result<Option<FrameBytes>> {
    if !mat.lcd_id.is_assigned() {
        return Ok(None);
    }
    let mut text = Vec::new();
    for cubby in mat.cubbies.iter() {
        let value = match page {
            DisplayPage::Weight => format!("{:.0}g", cubby.weight),
            DisplayPage::Quantity => cubby.quantity.to_string(),
        };
        text.push(value.len() as u8);
        text.extend_from_slice(value.as_bytes());
    }
    let slot = mat_lcd_slot(index);
    let command = match page {
        DisplayPage::Weight => LcdCommand::WeightText { slot, text },
        DisplayPage::Quantity => LcdCommand::QuantityText { slot, text },
    };
    lcd(mat.lcd_id, &command).map(Some)
}
