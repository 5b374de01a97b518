//! RDM parameter ids, command classes, response types and NACK reasons.

use strum::{Display, FromRepr};

/// RDM parameter ids understood by this implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, FromRepr, Display)]
#[repr(u16)]
pub enum ParameterId {
    DiscUniqueBranch = 0x0001,
    DiscMute = 0x0002,
    DiscUnMute = 0x0003,
    CommsStatus = 0x0015,
    QueuedMessage = 0x0020,
    StatusMessages = 0x0030,
    SupportedParameters = 0x0050,
    ParameterDescription = 0x0051,
    DeviceInfo = 0x0060,
    ProductDetailIdList = 0x0070,
    DeviceModelDescription = 0x0080,
    ManufacturerLabel = 0x0081,
    DeviceLabel = 0x0082,
    FactoryDefaults = 0x0090,
    SoftwareVersionLabel = 0x00c0,
    BootSoftwareVersionId = 0x00c1,
    BootSoftwareVersionLabel = 0x00c2,
    DmxPersonality = 0x00e0,
    DmxPersonalityDescription = 0x00e1,
    DmxStartAddress = 0x00f0,
    SlotInfo = 0x0120,
    SlotDescription = 0x0121,
    DefaultSlotValue = 0x0122,
    SensorDefinition = 0x0200,
    SensorValue = 0x0201,
    RecordSensors = 0x0202,
    IdentifyDevice = 0x1000,
}

impl ParameterId {
    /// Returns `true` for discovery parameters, which are never announced in
    /// SUPPORTED_PARAMETERS and never produce NACKs.
    #[must_use]
    pub fn is_discovery(self) -> bool {
        matches!(self, Self::DiscUniqueBranch | Self::DiscMute | Self::DiscUnMute)
    }

    /// Returns `true` for administrative parameters that only the root
    /// device answers; requests naming them on a sub-device are dropped
    /// without a NACK.
    #[must_use]
    pub fn is_root_only(self) -> bool {
        matches!(
            self,
            Self::DiscUniqueBranch
                | Self::DiscMute
                | Self::DiscUnMute
                | Self::SupportedParameters
                | Self::ParameterDescription
                | Self::DeviceInfo
                | Self::SoftwareVersionLabel
                | Self::DmxStartAddress
                | Self::IdentifyDevice
        )
    }
}

/// RDM command classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, Display)]
#[repr(u8)]
pub enum CommandClass {
    DiscoveryCommand = 0x10,
    DiscoveryResponse = 0x11,
    GetCommand = 0x20,
    GetResponse = 0x21,
    SetCommand = 0x30,
    SetResponse = 0x31,
}

impl CommandClass {
    /// Returns `true` for the three request classes.
    #[must_use]
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Self::DiscoveryCommand | Self::GetCommand | Self::SetCommand
        )
    }
}

/// Maps a raw request command class to its response class; values that are
/// not request classes pass through unchanged.
#[must_use]
pub fn response_class_raw(raw: u8) -> u8 {
    match CommandClass::from_repr(raw) {
        Some(CommandClass::DiscoveryCommand) => CommandClass::DiscoveryResponse as u8,
        Some(CommandClass::GetCommand) => CommandClass::GetResponse as u8,
        Some(CommandClass::SetCommand) => CommandClass::SetResponse as u8,
        _ => raw,
    }
}

/// Response type carried in the port-id field of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, Display)]
#[repr(u8)]
pub enum ResponseType {
    Ack = 0x00,
    AckTimer = 0x01,
    NackReason = 0x02,
    AckOverflow = 0x03,
}

/// Reason codes carried by NACK_REASON responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, thiserror::Error)]
#[repr(u16)]
pub enum NackReason {
    #[error("unknown parameter id")]
    UnknownPid = 0x0000,
    #[error("request malformed")]
    FormatError = 0x0001,
    #[error("internal hardware fault")]
    HardwareFault = 0x0002,
    #[error("proxy rejected the message")]
    ProxyReject = 0x0003,
    #[error("parameter is write protected")]
    WriteProtect = 0x0004,
    #[error("command class not supported for this parameter")]
    UnsupportedCommandClass = 0x0005,
    #[error("value out of range")]
    DataOutOfRange = 0x0006,
    #[error("responder cannot buffer the message")]
    BufferFull = 0x0007,
    #[error("packet size not supported")]
    PacketSizeUnsupported = 0x0008,
    #[error("sub-device out of range")]
    SubDeviceOutOfRange = 0x0009,
    #[error("proxy queue is full")]
    ProxyBufferFull = 0x000a,
}

/// Status type argument of QUEUED_MESSAGE and STATUS_MESSAGES.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, Display)]
#[repr(u8)]
pub enum StatusType {
    StatusNone = 0x00,
    GetLastMessage = 0x01,
    StatusAdvisory = 0x02,
    StatusWarning = 0x03,
    StatusError = 0x04,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_round_trip() {
        assert_eq!(
            ParameterId::from_repr(0x00f0),
            Some(ParameterId::DmxStartAddress)
        );
        assert_eq!(ParameterId::from_repr(0x7fe0), None);
    }

    #[test]
    fn root_only_set_includes_discovery() {
        assert!(ParameterId::DiscMute.is_root_only());
        assert!(ParameterId::DmxStartAddress.is_root_only());
        assert!(!ParameterId::DeviceLabel.is_root_only());
        assert!(!ParameterId::SensorValue.is_root_only());
    }

    #[test]
    fn response_class_mapping() {
        assert_eq!(
            response_class_raw(CommandClass::DiscoveryCommand as u8),
            CommandClass::DiscoveryResponse as u8
        );
        assert_eq!(
            response_class_raw(CommandClass::GetCommand as u8),
            CommandClass::GetResponse as u8
        );
        assert_eq!(
            response_class_raw(CommandClass::SetCommand as u8),
            CommandClass::SetResponse as u8
        );
        assert_eq!(response_class_raw(0x42), 0x42);
    }
}
