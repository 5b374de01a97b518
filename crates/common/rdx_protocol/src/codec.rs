//! RDM frame serialization and validation.

use core::num::Wrapping;

use dataview::DataView;

use crate::{MIN_RDM_FRAME_SIZE, RdmHeader, SC_RDM, SC_SUB_MESSAGE};

/// Why a received byte window is not a valid RDM frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than a bare header plus checksum.
    #[error("frame shorter than minimum RDM frame")]
    ShortFrame,
    /// Declared lengths disagree with each other or with the received
    /// window.
    #[error("declared message length inconsistent")]
    LengthMismatch,
    /// The additive checksum does not match.
    #[error("checksum mismatch")]
    ChecksumInvalid,
    /// Start code or sub-start code identify a different protocol; the
    /// window is ignored without touching the comms-status counters.
    #[error("not an RDM message")]
    NotRdm,
}

/// 16-bit additive checksum over `bytes`.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .map(|b| Wrapping(u16::from(*b)))
        .sum::<Wrapping<u16>>()
        .0
}

/// Appends the big-endian checksum over `frame[..message_length]` and
/// returns the total frame length.
///
/// # Panics
///
/// Panics if the buffer cannot hold the two checksum bytes.
pub fn append_checksum(frame: &mut [u8], message_length: usize) -> usize {
    assert!(message_length + 2 <= frame.len());
    let sum = checksum(&frame[..message_length]);
    frame[message_length..message_length + 2].copy_from_slice(&sum.to_be_bytes());
    message_length + 2
}

/// Checks a received window for RDM frame validity and returns a view of
/// its header.
///
/// # Errors
///
/// [`FrameError::ShortFrame`], [`FrameError::LengthMismatch`] and
/// [`FrameError::ChecksumInvalid`] each correspond to one comms-status
/// counter; [`FrameError::NotRdm`] corresponds to none.
pub fn validate(frame: &[u8]) -> Result<&RdmHeader, FrameError> {
    if frame.len() < MIN_RDM_FRAME_SIZE {
        return Err(FrameError::ShortFrame);
    }

    let header = DataView::from(frame).get::<RdmHeader>(0);
    if header.start_code != SC_RDM || header.sub_start_code != SC_SUB_MESSAGE {
        return Err(FrameError::NotRdm);
    }

    let message_length = usize::from(header.message_length);
    if message_length < RdmHeader::SIZE
        || message_length + 2 > frame.len()
        || message_length != RdmHeader::SIZE + usize::from(header.param_data_length)
    {
        return Err(FrameError::LengthMismatch);
    }

    let declared = u16::from_be_bytes([frame[message_length], frame[message_length + 1]]);
    if checksum(&frame[..message_length]) != declared {
        return Err(FrameError::ChecksumInvalid);
    }

    Ok(header)
}

/// Big-endian serializer over a borrowed buffer.
///
/// All `push` methods panic on overflow; callers size the buffer for the
/// worst-case frame up front.
pub struct MessageWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> MessageWriter<'a> {
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remaining capacity in bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.len
    }

    pub fn push_u8(&mut self, value: u8) {
        assert!(self.len < self.buf.len());
        self.buf[self.len] = value;
        self.len += 1;
    }

    pub fn push_u16(&mut self, value: u16) {
        self.push_slice(&value.to_be_bytes());
    }

    pub fn push_u32(&mut self, value: u32) {
        self.push_slice(&value.to_be_bytes());
    }

    pub fn push_i16(&mut self, value: i16) {
        self.push_slice(&value.to_be_bytes());
    }

    pub fn push_slice(&mut self, bytes: &[u8]) {
        assert!(self.len + bytes.len() <= self.buf.len());
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
    }

    pub fn push_str(&mut self, s: &str) {
        self.push_slice(s.as_bytes());
    }

    /// Consumes the writer and returns the number of bytes written.
    #[must_use]
    pub fn finish(self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use dataview::PodMethods as _;
    use rdx_types::{SubDevice, Uid};

    use super::*;
    use crate::{CommandClass, MAX_RDM_FRAME_SIZE, ParameterId};

    fn build_frame(buf: &mut [u8], param_data: &[u8]) -> usize {
        let mut header = RdmHeader::new();
        header.set_dest_uid(Uid::new(0x7a70, 1));
        header.set_src_uid(Uid::new(0x0001, 1));
        header.transaction_number = 7;
        header.port_id = 1;
        header.set_sub_device(SubDevice::ROOT);
        header.set_command_class(CommandClass::GetCommand);
        header.set_param_id(ParameterId::DeviceInfo as u16);
        header.param_data_length = u8::try_from(param_data.len()).unwrap();
        header.message_length = u8::try_from(RdmHeader::SIZE + param_data.len()).unwrap();

        let mut writer = MessageWriter::new(buf);
        writer.push_slice(header.as_bytes());
        writer.push_slice(param_data);
        let len = writer.finish();
        append_checksum(buf, len)
    }

    #[test]
    fn serialize_validate_round_trip() {
        let mut buf = [0; MAX_RDM_FRAME_SIZE];
        let len = build_frame(&mut buf, &[0xde, 0xad]);
        assert_eq!(len, RdmHeader::SIZE + 2 + 2);

        let header = validate(&buf[..len]).unwrap();
        assert_eq!(header.dest_uid(), Uid::new(0x7a70, 1));
        assert_eq!(header.src_uid(), Uid::new(0x0001, 1));
        assert_eq!(header.transaction_number, 7);
        assert_eq!(header.param_data_length, 2);
    }

    #[test]
    fn checksum_is_additive() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x01, 0x02, 0x03]), 6);
        // Sum wraps at 16 bits.
        let frame = [0xff; 300];
        assert_eq!(checksum(&frame), (300 * 0xff_u32 % 0x1_0000) as u16);
    }

    #[test]
    fn short_frame_rejected() {
        let buf = [0xcc; 10];
        assert_eq!(validate(&buf), Err(FrameError::ShortFrame));
    }

    #[test]
    fn foreign_start_code_rejected() {
        let mut buf = [0; MAX_RDM_FRAME_SIZE];
        let len = build_frame(&mut buf, &[]);
        buf[0] = 0x00;
        assert_eq!(validate(&buf[..len]), Err(FrameError::NotRdm));
    }

    #[test]
    fn length_mismatch_rejected() {
        let mut buf = [0; MAX_RDM_FRAME_SIZE];
        let len = build_frame(&mut buf, &[1, 2, 3]);

        // Declared message length disagrees with the parameter data length.
        buf[2] = buf[2].wrapping_add(1);
        assert_eq!(validate(&buf[..len]), Err(FrameError::LengthMismatch));

        // Declared message length runs past the received window.
        buf[2] = 200;
        assert_eq!(validate(&buf[..len]), Err(FrameError::LengthMismatch));
    }

    #[test]
    fn corrupted_byte_fails_checksum() {
        let mut buf = [0; MAX_RDM_FRAME_SIZE];
        let len = build_frame(&mut buf, &[1, 2, 3]);
        buf[10] ^= 0x40;
        assert_eq!(validate(&buf[..len]), Err(FrameError::ChecksumInvalid));
    }

    #[test]
    fn writer_tracks_length() {
        let mut buf = [0; 16];
        let mut writer = MessageWriter::new(&mut buf);
        writer.push_u8(0x01);
        writer.push_u16(0x0203);
        writer.push_u32(0x0405_0607);
        writer.push_str("ab");
        assert_eq!(writer.len(), 9);
        assert_eq!(writer.finish(), 9);
        assert_eq!(&buf[..9], &[1, 2, 3, 4, 5, 6, 7, b'a', b'b']);
    }
}
