//! DMX slot vocabulary (SLOT_INFO / SLOT_DESCRIPTION / DEFAULT_SLOT_VALUE).

use strum::{Display, FromRepr};

/// Role of a slot within a personality footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, Display)]
#[repr(u8)]
pub enum SlotType {
    Primary = 0x00,
    SecondaryFine = 0x01,
    SecondaryTiming = 0x02,
    SecondarySpeed = 0x03,
    SecondaryControl = 0x04,
    SecondaryIndex = 0x05,
    SecondaryRotation = 0x06,
    SecondaryIndexRotate = 0x07,
    SecondaryUndefined = 0xff,
}

/// Well-known slot label ids.
///
/// The label space is open (manufacturers may define their own above
/// 0x8000), so these are plain constants rather than an enum.
pub mod labels {
    pub const INTENSITY: u16 = 0x0001;
    pub const INTENSITY_MASTER: u16 = 0x0002;
    pub const PAN: u16 = 0x0101;
    pub const TILT: u16 = 0x0102;
    pub const COLOR_ADD_RED: u16 = 0x0205;
    pub const COLOR_ADD_GREEN: u16 = 0x0206;
    pub const COLOR_ADD_BLUE: u16 = 0x0207;
    pub const UNDEFINED: u16 = 0xffff;
}
