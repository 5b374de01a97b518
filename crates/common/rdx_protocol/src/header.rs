//! The 24-byte RDM message header.

use dataview::{Pod, PodMethods as _};
use rdx_types::{SubDevice, Uid};

use crate::{
    CommandClass, ResponseType, SC_RDM, SC_SUB_MESSAGE,
    pid::{self, ParameterId},
};

/// The fixed prefix of every RDM message.
///
/// Multi-byte fields are big-endian on the wire and stored here as byte
/// arrays so the struct stays alignment-1 and can be viewed in place over
/// the frame buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod)]
pub struct RdmHeader {
    /// Always [`SC_RDM`].
    pub start_code: u8,
    /// Always [`SC_SUB_MESSAGE`].
    pub sub_start_code: u8,
    /// Length of the message up to but excluding the checksum.
    pub message_length: u8,
    dest_uid: Uid,
    src_uid: Uid,
    /// Echoed by responders; lets the controller pair replies to requests.
    pub transaction_number: u8,
    /// Port id in requests, response type in replies.
    pub port_id: u8,
    /// Number of queued messages held by the responder.
    pub message_count: u8,
    sub_device: [u8; 2],
    command_class: u8,
    param_id: [u8; 2],
    /// Length of the parameter-data section.
    pub param_data_length: u8,
}

impl RdmHeader {
    /// Size of the header on the wire.
    pub const SIZE: usize = 24;

    /// Returns a header with both start codes set and everything else
    /// zeroed.
    #[must_use]
    pub fn new() -> Self {
        let mut header = Self::zeroed();
        header.start_code = SC_RDM;
        header.sub_start_code = SC_SUB_MESSAGE;
        header
    }

    #[must_use]
    pub fn dest_uid(&self) -> Uid {
        self.dest_uid
    }

    pub fn set_dest_uid(&mut self, uid: Uid) {
        self.dest_uid = uid;
    }

    #[must_use]
    pub fn src_uid(&self) -> Uid {
        self.src_uid
    }

    pub fn set_src_uid(&mut self, uid: Uid) {
        self.src_uid = uid;
    }

    #[must_use]
    pub fn sub_device(&self) -> SubDevice {
        SubDevice::new(u16::from_be_bytes(self.sub_device))
    }

    pub fn set_sub_device(&mut self, sub_device: SubDevice) {
        self.sub_device = sub_device.value().to_be_bytes();
    }

    #[must_use]
    pub fn command_class(&self) -> Option<CommandClass> {
        CommandClass::from_repr(self.command_class)
    }

    #[must_use]
    pub fn command_class_raw(&self) -> u8 {
        self.command_class
    }

    pub fn set_command_class(&mut self, class: CommandClass) {
        self.command_class = class as u8;
    }

    #[must_use]
    pub fn param_id(&self) -> u16 {
        u16::from_be_bytes(self.param_id)
    }

    #[must_use]
    pub fn parameter_id(&self) -> Option<ParameterId> {
        ParameterId::from_repr(self.param_id())
    }

    pub fn set_param_id(&mut self, pid: u16) {
        self.param_id = pid.to_be_bytes();
    }

    pub fn set_response_type(&mut self, response_type: ResponseType) {
        self.port_id = response_type as u8;
    }

    #[must_use]
    pub fn response_type(&self) -> Option<ResponseType> {
        ResponseType::from_repr(self.port_id)
    }

    /// Total length of the frame including the trailing checksum.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        usize::from(self.message_length) + 2
    }

    /// Fills in the header of a reply to `self`, addressed back to the
    /// requester and sourced from `own_uid`.
    ///
    /// Transaction number and sub-device are echoed; the command class is
    /// mapped to its response class; message length and parameter-data
    /// length are left for the caller to fill once the parameter data is
    /// written.
    #[must_use]
    pub fn reply_template(&self, own_uid: Uid, message_count: u8) -> Self {
        let mut reply = Self::new();
        reply.set_dest_uid(self.src_uid());
        reply.set_src_uid(own_uid);
        reply.transaction_number = self.transaction_number;
        reply.message_count = message_count;
        reply.set_sub_device(self.sub_device());
        reply.command_class = pid::response_class_raw(self.command_class);
        reply.param_id = self.param_id;
        reply
    }
}

impl Default for RdmHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_24_bytes() {
        assert_eq!(size_of::<RdmHeader>(), RdmHeader::SIZE);
        assert_eq!(align_of::<RdmHeader>(), 1);
    }

    #[test]
    fn big_endian_fields() {
        let mut header = RdmHeader::new();
        header.set_sub_device(SubDevice::new(0x0102));
        header.set_param_id(0x00f0);
        assert_eq!(header.sub_device, [0x01, 0x02]);
        assert_eq!(header.param_id, [0x00, 0xf0]);
        assert_eq!(header.param_id(), 0x00f0);
        assert_eq!(header.parameter_id(), Some(ParameterId::DmxStartAddress));
    }

    #[test]
    fn reply_template_echoes_request() {
        let own = Uid::new(0x7a70, 1);
        let mut request = RdmHeader::new();
        request.set_dest_uid(own);
        request.set_src_uid(Uid::new(0x0001, 2));
        request.transaction_number = 0x42;
        request.set_sub_device(SubDevice::new(3));
        request.set_command_class(CommandClass::GetCommand);
        request.set_param_id(ParameterId::DeviceInfo as u16);

        let reply = request.reply_template(own, 0);
        assert_eq!(reply.dest_uid(), request.src_uid());
        assert_eq!(reply.src_uid(), own);
        assert_eq!(reply.transaction_number, 0x42);
        assert_eq!(reply.sub_device(), SubDevice::new(3));
        assert_eq!(reply.command_class(), Some(CommandClass::GetResponse));
        assert_eq!(reply.param_id(), ParameterId::DeviceInfo as u16);
    }
}
