//! Wire model for DMX512 (ANSI E1.11) and RDM (ANSI E1.20) frames.
//!
//! The RDM frame layout:
//!
//! | bytes            | content                              | type             |
//! |------------------|--------------------------------------|------------------|
//! | 0..24            | message header (incl. start codes)   | [`RdmHeader`]    |
//! | 24..24+pdl       | parameter data                       | raw bytes        |
//! | 24+pdl..24+pdl+2 | additive checksum                    | big-endian `u16` |
//!
//! Discovery (DISC_UNIQUE_BRANCH) responses use a different framing with no
//! break and no header; see [`dub`].

#![cfg_attr(not(test), no_std)]

use bitflags::bitflags;

pub mod codec;
pub mod dub;
pub mod header;
pub mod pid;
pub mod sensor;
pub mod slot;

pub use self::{
    codec::{FrameError, MessageWriter, append_checksum, checksum, validate},
    header::RdmHeader,
    pid::{CommandClass, NackReason, ParameterId, ResponseType, StatusType},
};

/// Start code of a null-start-code DMX512 frame.
pub const SC_DMX512: u8 = 0x00;
/// Start code of an RDM frame.
pub const SC_RDM: u8 = 0xcc;
/// RDM sub-start code (the only one defined by E1.20).
pub const SC_SUB_MESSAGE: u8 = 0x01;

/// Maximum number of data slots in a DMX512 universe.
pub const MAX_DMX_SLOTS: usize = 512;
/// Largest DMX frame on the wire: start code plus a full universe.
pub const MAX_DMX_FRAME_SIZE: usize = 1 + MAX_DMX_SLOTS;

/// Largest value of the RDM message-length field.
pub const MAX_MESSAGE_LENGTH: usize = 255;
/// Largest RDM parameter-data section.
pub const MAX_PARAM_DATA_LENGTH: usize = MAX_MESSAGE_LENGTH - RdmHeader::SIZE;
/// Largest RDM frame on the wire (message plus checksum).
pub const MAX_RDM_FRAME_SIZE: usize = MAX_MESSAGE_LENGTH + 2;
/// Smallest valid RDM frame on the wire (bare header plus checksum).
pub const MIN_RDM_FRAME_SIZE: usize = RdmHeader::SIZE + 2;

/// RDM protocol version reported in DEVICE_INFO.
pub const PROTOCOL_VERSION: u16 = 0x0100;

/// DMX start address reported when the current personality occupies no
/// slots.
pub const INVALID_DMX_START_ADDRESS: u16 = 0xffff;

bitflags! {
    /// Control field of DISC_MUTE / DISC_UN_MUTE responses.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct ControlField: u16 {
        /// The device contains sub-devices.
        const SUB_DEVICES_PRESENT = 1 << 0;
        /// The device is a managed proxy.
        const MANAGED_PROXY = 1 << 1;
        /// The device is reachable only through a proxy.
        const PROXIED_DEVICE = 1 << 2;
    }
}

/// Product categories reported in DEVICE_INFO.
pub mod product {
    pub const CATEGORY_NOT_DECLARED: u16 = 0x0000;
    pub const CATEGORY_TEST_EQUIPMENT: u16 = 0x7100;
    pub const CATEGORY_OTHER: u16 = 0x7fff;

    pub const DETAIL_NOT_DECLARED: u16 = 0x0000;
    pub const DETAIL_ARC: u16 = 0x0001;
    pub const DETAIL_METAL_HALIDE: u16 = 0x0002;
    pub const DETAIL_INCANDESCENT: u16 = 0x0003;
    pub const DETAIL_LED: u16 = 0x0004;
    pub const DETAIL_FLUORESCENT: u16 = 0x0005;
    pub const DETAIL_OTHER: u16 = 0x7fff;
}
