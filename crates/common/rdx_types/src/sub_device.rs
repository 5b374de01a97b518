//! Sub-device addressing.

use core::fmt;

use dataview::Pod;

/// A 16-bit sub-device address within one physical RDM device.
///
/// `0` is the root device; `0xffff` addresses every sub-device at once
/// (SET commands only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Pod)]
#[repr(transparent)]
pub struct SubDevice(u16);

impl SubDevice {
    /// The root device.
    pub const ROOT: Self = Self(0);
    /// All sub-devices at once.
    pub const ALL_CALL: Self = Self(0xffff);

    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn is_root(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_all_call(self) -> bool {
        self.0 == 0xffff
    }
}

impl fmt::Display for SubDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u16> for SubDevice {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<SubDevice> for u16 {
    fn from(value: SubDevice) -> Self {
        value.0
    }
}
