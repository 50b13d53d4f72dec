//! This module defines range-checked types for bus addresses, opcodes and
//! display slots, meant to simplify correct usage of the API.

use snafu::{ensure, OptionExt, Snafu};

use core::convert::{TryFrom, TryInto};
use core::ops::Deref;

/// Error type for this module
#[derive(Debug, Snafu, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The value isn't a valid 16-bit bus address.
    #[snafu(display("Invalid address"))]
    InvalidAddress,
    /// The value doesn't name a known MCU family.
    #[snafu(display("Invalid MCU family {}", family))]
    InvalidMcuFamily { family: u8 },
    /// The value isn't a valid LCD slot number.
    #[snafu(display("Invalid LCD slot"))]
    InvalidLcdSlot,
}

const fn invalid_address() -> InvalidAddressSnafu {
    InvalidAddressSnafu
}

const fn invalid_lcd_slot() -> InvalidLcdSlotSnafu {
    InvalidLcdSlotSnafu
}

/// Logical 16-bit address of a device on the bus.
///
/// Address 0 is used by devices that haven't been assigned an id yet, and as
/// the target of the identity commands.
///
/// ## Example
/// ```
/// use cubby_bus::DeviceAddress;
/// let addr = DeviceAddress::new(0x0201).unwrap();
/// assert_eq!(addr.to_bytes(), [0x02, 0x01]);
/// ```
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash, Default)]
#[repr(transparent)]
pub struct DeviceAddress(u16);

/// Create a new [`DeviceAddress`].
pub const fn addr(a: u16) -> DeviceAddress {
    DeviceAddress(a)
}

impl DeviceAddress {
    /// The address of a device that hasn't been given an id.
    pub const UNASSIGNED: DeviceAddress = DeviceAddress(0);

    /// Create a new address, checking that it fits in 16 bits.
    /// # Errors
    /// Returns [`Error::InvalidAddress`] if `address` is out of range.
    pub fn new(address: impl TryInto<u16>) -> Result<Self, Error> {
        let address = address.try_into().ok().with_context(invalid_address)?;
        Ok(Self(address))
    }

    pub const fn from_bytes(hi: u8, lo: u8) -> Self {
        Self(((hi as u16) << 8) | lo as u16)
    }

    /// Big-endian wire representation.
    pub const fn to_bytes(self) -> [u8; 2] {
        [(self.0 >> 8) as u8, self.0 as u8]
    }

    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl Deref for DeviceAddress {
    type Target = u16;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq<u16> for DeviceAddress {
    fn eq(&self, other: &u16) -> bool {
        self.0 == *other
    }
}

impl From<u16> for DeviceAddress {
    fn from(a: u16) -> Self {
        Self(a)
    }
}

/// Trait to convert `T: TryInto<u16>` into a [`DeviceAddress`].
pub trait IntoAddress {
    /// Convert self to an address.
    /// # Errors
    /// Returns `Error::InvalidAddress` if self isn't a valid address.
    fn into_address(self) -> Result<DeviceAddress, Error>;
}

impl IntoAddress for DeviceAddress {
    fn into_address(self) -> Result<DeviceAddress, Error> {
        Ok(self)
    }
}

impl<T> IntoAddress for T
where
    T: TryInto<u16>,
{
    fn into_address(self) -> Result<DeviceAddress, Error> {
        DeviceAddress::new(self)
    }
}


/// The microcontroller family of a peripheral. The two families answer to
/// different identity opcodes.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub enum McuFamily {
    Holtek,
    Stm32,
}

impl McuFamily {
    pub const fn identity_opcode(self) -> Opcode {
        Opcode::Identity(self)
    }
}

impl TryFrom<u8> for McuFamily {
    type Error = Error;

    /// Family numbers as used by the application layer: 1 = Holtek, 2 = STM32.
    fn try_from(family: u8) -> Result<Self, Self::Error> {
        match family {
            1 => Ok(McuFamily::Holtek),
            2 => Ok(McuFamily::Stm32),
            _ => InvalidMcuFamilySnafu { family }.fail(),
        }
    }
}

/// Which of the four LCD commands a display frame carries.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub enum DisplayKind {
    /// 0xA1, text in a fixed-length field followed by the slot number.
    FixedField,
    /// 0xA2, slot number followed by length-prefixed weight strings.
    WeightText,
    /// 0xA3, slot number followed by length-prefixed quantity strings.
    QuantityText,
    /// 0xA4, highlight and background flags for a slot.
    ModeFlags,
}

/// The closed set of opcodes this controller knows about.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub enum Opcode {
    Identity(McuFamily),
    Weight,
    Led,
    Lcd(DisplayKind),
}

const OP_HOLTEK_ID: u8 = 0xFF;
const OP_STM32_ID: u8 = 0xFE;
const OP_WEIGHT: u8 = 0x03;
const OP_LED: u8 = 0x05;
const OP_LCD_A1: u8 = 0xA1;
const OP_LCD_A2: u8 = 0xA2;
const OP_LCD_A3: u8 = 0xA3;
const OP_LCD_A4: u8 = 0xA4;

impl Opcode {
    /// Returns `None` for opcode bytes outside the known set.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        use DisplayKind::*;
        Some(match byte {
            OP_HOLTEK_ID => Opcode::Identity(McuFamily::Holtek),
            OP_STM32_ID => Opcode::Identity(McuFamily::Stm32),
            OP_WEIGHT => Opcode::Weight,
            OP_LED => Opcode::Led,
            OP_LCD_A1 => Opcode::Lcd(FixedField),
            OP_LCD_A2 => Opcode::Lcd(WeightText),
            OP_LCD_A3 => Opcode::Lcd(QuantityText),
            OP_LCD_A4 => Opcode::Lcd(ModeFlags),
            _ => return None,
        })
    }

    pub const fn to_byte(self) -> u8 {
        use DisplayKind::*;
        match self {
            Opcode::Identity(McuFamily::Holtek) => OP_HOLTEK_ID,
            Opcode::Identity(McuFamily::Stm32) => OP_STM32_ID,
            Opcode::Weight => OP_WEIGHT,
            Opcode::Led => OP_LED,
            Opcode::Lcd(FixedField) => OP_LCD_A1,
            Opcode::Lcd(WeightText) => OP_LCD_A2,
            Opcode::Lcd(QuantityText) => OP_LCD_A3,
            Opcode::Lcd(ModeFlags) => OP_LCD_A4,
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op.to_byte()
    }
}

/// `LcdSlot` is a range-checked \[1, 8\] slot number on a shared display.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct LcdSlot(u8);

/// Create a new [`LcdSlot`], panics if it is out of range.
pub const fn lcd_slot(n: u8) -> LcdSlot {
    if n >= 1 && n <= 8 {
        LcdSlot(n)
    } else {
        panic!("Invalid LCD slot.")
    }
}

impl LcdSlot {
    /// # Errors
    /// Returns [`Error::InvalidLcdSlot`] if `slot` is outside \[1, 8\].
    pub fn new(slot: impl TryInto<u8>) -> Result<Self, Error> {
        let slot = slot.try_into().ok().with_context(invalid_lcd_slot)?;
        ensure!((1..=8).contains(&slot), invalid_lcd_slot());
        Ok(Self(slot))
    }

    /// One-hot mask selecting this slot.
    pub const fn mask(self) -> u8 {
        1 << (self.0 - 1)
    }
}

impl Deref for LcdSlot {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
