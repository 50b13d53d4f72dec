//! Sans-io controller for a half-duplex RS-485 weighing bus.
//!
//! A single controller polls passive devices: mats with four weighing
//! cubbies and boxes with up to 24 cups. Raw ADC readings are turned into
//! weights and item counts, and the controller pushes identity, LED and LCD
//! commands back onto the bus.
//!
//! The protocol pieces ([`frame`], [`dispatch`], [`weight`], [`registry`])
//! never touch I/O. [`scheduler`] drives them through the [`Transport`]
//! trait, and [`controller::Controller`] ties the loop together with a
//! [`ConfigStore`] for device identities and calibration.

mod buffer;
pub mod command;
pub mod config;
pub mod controller;
pub mod device;
pub mod dispatch;
pub mod frame;
mod nom_parser;
pub mod registry;
pub mod scheduler;
pub mod types;
pub mod weight;

pub use config::ConfigStore;
pub use controller::Controller;
pub use frame::Frame;
pub use registry::DeviceRegistry;
pub use scheduler::Transport;
pub use types::{addr, lcd_slot, DeviceAddress, IntoAddress, LcdSlot, McuFamily, Opcode};

/// First byte of every frame on the bus.
pub const PREFIX: u8 = 0x55;

/// 16-bit additive checksum, the wrapping sum of all bytes.
pub fn sum16(data: &[u8]) -> u16 {
    data.iter()
        .fold(0u16, |sum, byte| sum.wrapping_add(u16::from(*byte)))
}

#[cfg(test)]
mod tests {
    use super::sum16;

    #[test]
    fn test_sum16() {
        assert_eq!(sum16(&[]), 0);
        // header of a weight poll to 0x0201 with host address 0x0101
        let poll = [
            0x55, 0x10, 0x01, 0x01, 0x01, 0x02, 0x01, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00,
        ];
        assert_eq!(sum16(&poll), 0x006E);
    }

    #[test]
    fn test_sum16_wraps() {
        let data = [0xFFu8; 258];
        assert_eq!(sum16(&data), (258u32 * 0xFF % 0x1_0000) as u16);
    }
}
