//! Parameter handlers and the descriptor table they are dispatched from.
//!
//! Each handler reads the request from its context and writes reply
//! parameter data through the context writer. GET parameter sizes are
//! enforced by the dispatcher from the descriptor table; SET handlers
//! validate their own lengths and ranges.

use rdx_protocol::{
    MAX_DMX_SLOTS, PROTOCOL_VERSION, ParameterId, StatusType,
    pid::NackReason,
    sensor::ALL_SENSORS,
};

use super::{Context, Outcome, model};

pub(crate) type Handler = fn(&mut Context<'_, '_>) -> Outcome;

pub(crate) struct PidDescriptor {
    pub(crate) pid: ParameterId,
    pub(crate) get: Option<Handler>,
    pub(crate) set: Option<Handler>,
    pub(crate) get_param_size: u8,
}

/// Discovery parameters live in the dispatcher, not here; everything else
/// is table-driven. Sorted by parameter id for the binary search.
pub(crate) static PID_TABLE: &[PidDescriptor] = &[
    PidDescriptor {
        pid: ParameterId::CommsStatus,
        get: Some(get_comms_status),
        set: Some(set_comms_status),
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::QueuedMessage,
        get: Some(get_queued_message),
        set: None,
        get_param_size: 1,
    },
    PidDescriptor {
        pid: ParameterId::StatusMessages,
        get: Some(get_status_messages),
        set: None,
        get_param_size: 1,
    },
    PidDescriptor {
        pid: ParameterId::SupportedParameters,
        get: Some(get_supported_parameters),
        set: None,
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::ParameterDescription,
        get: Some(get_parameter_description),
        set: None,
        get_param_size: 2,
    },
    PidDescriptor {
        pid: ParameterId::DeviceInfo,
        get: Some(get_device_info),
        set: None,
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::ProductDetailIdList,
        get: Some(get_product_detail_ids),
        set: None,
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::DeviceModelDescription,
        get: Some(get_device_model_description),
        set: None,
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::ManufacturerLabel,
        get: Some(get_manufacturer_label),
        set: None,
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::DeviceLabel,
        get: Some(get_device_label),
        set: Some(set_device_label),
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::FactoryDefaults,
        get: Some(get_factory_defaults),
        set: Some(set_factory_defaults),
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::SoftwareVersionLabel,
        get: Some(get_software_version_label),
        set: None,
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::BootSoftwareVersionId,
        get: Some(get_boot_software_version_id),
        set: None,
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::BootSoftwareVersionLabel,
        get: Some(get_boot_software_version_label),
        set: None,
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::DmxPersonality,
        get: Some(get_dmx_personality),
        set: Some(set_dmx_personality),
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::DmxPersonalityDescription,
        get: Some(get_dmx_personality_description),
        set: None,
        get_param_size: 1,
    },
    PidDescriptor {
        pid: ParameterId::DmxStartAddress,
        get: Some(get_dmx_start_address),
        set: Some(set_dmx_start_address),
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::SlotInfo,
        get: Some(get_slot_info),
        set: None,
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::SlotDescription,
        get: Some(get_slot_description),
        set: None,
        get_param_size: 2,
    },
    PidDescriptor {
        pid: ParameterId::DefaultSlotValue,
        get: Some(get_default_slot_value),
        set: None,
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::SensorDefinition,
        get: Some(get_sensor_definition),
        set: None,
        get_param_size: 1,
    },
    PidDescriptor {
        pid: ParameterId::SensorValue,
        get: Some(get_sensor_value),
        set: Some(set_sensor_value),
        get_param_size: 1,
    },
    PidDescriptor {
        pid: ParameterId::RecordSensors,
        get: None,
        set: Some(set_record_sensors),
        get_param_size: 0,
    },
    PidDescriptor {
        pid: ParameterId::IdentifyDevice,
        get: Some(get_identify_device),
        set: Some(set_identify_device),
        get_param_size: 0,
    },
];

pub(crate) fn lookup(pid: u16) -> Option<&'static PidDescriptor> {
    PID_TABLE
        .binary_search_by_key(&pid, |descriptor| descriptor.pid as u16)
        .ok()
        .map(|index| &PID_TABLE[index])
}

fn get_comms_status(ctx: &mut Context<'_, '_>) -> Outcome {
    ctx.writer.push_u16(ctx.counters.short_frame());
    ctx.writer.push_u16(ctx.counters.length_mismatch());
    ctx.writer.push_u16(ctx.counters.checksum_invalid());
    Outcome::Ack
}

fn set_comms_status(ctx: &mut Context<'_, '_>) -> Outcome {
    if !ctx.request.data.is_empty() {
        return Outcome::Nack(NackReason::FormatError);
    }
    ctx.counters.reset_comms_status();
    Outcome::Ack
}

fn get_queued_message(ctx: &mut Context<'_, '_>) -> Outcome {
    match StatusType::from_repr(ctx.request.data[0]) {
        None | Some(StatusType::StatusNone) => Outcome::Nack(NackReason::DataOutOfRange),
        Some(_) => {
            // Nothing queued; answer as an empty STATUS_MESSAGES list.
            ctx.reply_param_id = Some(ParameterId::StatusMessages);
            Outcome::Ack
        }
    }
}

fn get_status_messages(ctx: &mut Context<'_, '_>) -> Outcome {
    match StatusType::from_repr(ctx.request.data[0]) {
        None | Some(StatusType::GetLastMessage) => Outcome::Nack(NackReason::DataOutOfRange),
        Some(_) => Outcome::Ack,
    }
}

fn get_supported_parameters(ctx: &mut Context<'_, '_>) -> Outcome {
    let is_sub = ctx.responder.is_sub_device();
    for descriptor in PID_TABLE {
        if is_sub && descriptor.pid.is_root_only() {
            continue;
        }
        ctx.writer.push_u16(descriptor.pid as u16);
    }
    Outcome::Ack
}

fn get_parameter_description(_ctx: &mut Context<'_, '_>) -> Outcome {
    // No manufacturer-specific parameters on this device.
    Outcome::Nack(NackReason::DataOutOfRange)
}

fn get_device_info(ctx: &mut Context<'_, '_>) -> Outcome {
    let responder = &ctx.responder;
    let def = responder.def();
    ctx.writer.push_u16(PROTOCOL_VERSION);
    ctx.writer.push_u16(def.model_id);
    ctx.writer.push_u16(def.product_category);
    ctx.writer.push_u32(def.software_version);
    ctx.writer
        .push_u16(u16::try_from(responder.footprint()).unwrap_or(0));
    ctx.writer.push_u8(responder.current_personality());
    ctx.writer
        .push_u8(u8::try_from(def.personalities.len()).unwrap_or(u8::MAX));
    ctx.writer.push_u16(responder.effective_dmx_start_address());
    ctx.writer.push_u16(ctx.sub_device_count);
    ctx.writer
        .push_u8(u8::try_from(responder.sensor_count()).unwrap_or(u8::MAX));
    Outcome::Ack
}

fn get_product_detail_ids(ctx: &mut Context<'_, '_>) -> Outcome {
    let ids = ctx.responder.def().product_detail_ids;
    for id in ids.iter().take(model::MAX_PRODUCT_DETAILS) {
        ctx.writer.push_u16(*id);
    }
    Outcome::Ack
}

fn get_device_model_description(ctx: &mut Context<'_, '_>) -> Outcome {
    ctx.writer.push_str(ctx.responder.def().model_description);
    Outcome::Ack
}

fn get_manufacturer_label(ctx: &mut Context<'_, '_>) -> Outcome {
    ctx.writer.push_str(ctx.responder.def().manufacturer_label);
    Outcome::Ack
}

fn get_device_label(ctx: &mut Context<'_, '_>) -> Outcome {
    ctx.writer.push_str(ctx.responder.device_label());
    Outcome::Ack
}

fn set_device_label(ctx: &mut Context<'_, '_>) -> Outcome {
    if ctx.request.data.len() > model::DEVICE_LABEL_MAX_LEN {
        return Outcome::Nack(NackReason::FormatError);
    }
    let Ok(label) = core::str::from_utf8(ctx.request.data) else {
        return Outcome::Nack(NackReason::FormatError);
    };
    if ctx.responder.device_label() != label {
        ctx.responder.device_label = model::clamp_label(label);
        ctx.responder.using_factory_defaults = false;
    }
    Outcome::Ack
}

fn get_factory_defaults(ctx: &mut Context<'_, '_>) -> Outcome {
    ctx.writer
        .push_u8(u8::from(ctx.responder.using_factory_defaults()));
    Outcome::Ack
}

fn set_factory_defaults(ctx: &mut Context<'_, '_>) -> Outcome {
    if !ctx.request.data.is_empty() {
        return Outcome::Nack(NackReason::FormatError);
    }
    ctx.responder.reset_to_factory_defaults();
    Outcome::Ack
}

fn get_software_version_label(ctx: &mut Context<'_, '_>) -> Outcome {
    ctx.writer
        .push_str(ctx.responder.def().software_version_label);
    Outcome::Ack
}

fn get_boot_software_version_id(ctx: &mut Context<'_, '_>) -> Outcome {
    ctx.writer.push_u32(ctx.responder.def().boot_software_version);
    Outcome::Ack
}

fn get_boot_software_version_label(ctx: &mut Context<'_, '_>) -> Outcome {
    ctx.writer
        .push_str(ctx.responder.def().boot_software_version_label);
    Outcome::Ack
}

fn get_dmx_personality(ctx: &mut Context<'_, '_>) -> Outcome {
    ctx.writer.push_u8(ctx.responder.current_personality());
    ctx.writer
        .push_u8(u8::try_from(ctx.responder.def().personalities.len()).unwrap_or(u8::MAX));
    Outcome::Ack
}

fn set_dmx_personality(ctx: &mut Context<'_, '_>) -> Outcome {
    let [value] = ctx.request.data else {
        return Outcome::Nack(NackReason::FormatError);
    };
    let count = ctx.responder.def().personalities.len();
    if *value == 0 || usize::from(*value) > count {
        return Outcome::Nack(NackReason::DataOutOfRange);
    }
    if ctx.responder.current_personality != *value {
        ctx.responder.current_personality = *value;
        ctx.responder.using_factory_defaults = false;
    }
    Outcome::Ack
}

fn get_dmx_personality_description(ctx: &mut Context<'_, '_>) -> Outcome {
    let index = ctx.request.data[0];
    let count = ctx.responder.def().personalities.len();
    if index == 0 || usize::from(index) > count {
        return Outcome::Nack(NackReason::DataOutOfRange);
    }
    let personality = &ctx.responder.def().personalities[usize::from(index) - 1];
    ctx.writer.push_u8(index);
    ctx.writer
        .push_u16(u16::try_from(personality.footprint()).unwrap_or(0));
    ctx.writer.push_str(personality.description);
    Outcome::Ack
}

fn get_dmx_start_address(ctx: &mut Context<'_, '_>) -> Outcome {
    ctx.writer.push_u16(ctx.responder.effective_dmx_start_address());
    Outcome::Ack
}

fn set_dmx_start_address(ctx: &mut Context<'_, '_>) -> Outcome {
    let [high, low] = ctx.request.data else {
        return Outcome::Nack(NackReason::FormatError);
    };
    let address = u16::from_be_bytes([*high, *low]);
    if address == 0 || usize::from(address) > MAX_DMX_SLOTS {
        return Outcome::Nack(NackReason::DataOutOfRange);
    }
    if ctx.responder.dmx_start_address != address {
        ctx.responder.dmx_start_address = address;
        ctx.responder.using_factory_defaults = false;
    }
    Outcome::Ack
}

fn get_slot_info(ctx: &mut Context<'_, '_>) -> Outcome {
    for (offset, slot) in ctx.responder.personality().slots.iter().enumerate() {
        if ctx.writer.remaining() < 5 {
            break;
        }
        ctx.writer.push_u16(u16::try_from(offset).unwrap_or(0));
        ctx.writer.push_u8(slot.slot_type as u8);
        ctx.writer.push_u16(slot.label_id);
    }
    Outcome::Ack
}

fn get_slot_description(ctx: &mut Context<'_, '_>) -> Outcome {
    let offset = u16::from_be_bytes([ctx.request.data[0], ctx.request.data[1]]);
    let slots = ctx.responder.personality().slots;
    let Some(slot) = slots.get(usize::from(offset)) else {
        return Outcome::Nack(NackReason::DataOutOfRange);
    };
    let Some(description) = slot.description else {
        return Outcome::Nack(NackReason::DataOutOfRange);
    };
    ctx.writer.push_u16(offset);
    ctx.writer.push_str(description);
    Outcome::Ack
}

fn get_default_slot_value(ctx: &mut Context<'_, '_>) -> Outcome {
    for (offset, slot) in ctx.responder.personality().slots.iter().enumerate() {
        if ctx.writer.remaining() < 3 {
            break;
        }
        ctx.writer.push_u16(u16::try_from(offset).unwrap_or(0));
        ctx.writer.push_u8(slot.default_value);
    }
    Outcome::Ack
}

fn get_sensor_definition(ctx: &mut Context<'_, '_>) -> Outcome {
    let index = ctx.request.data[0];
    let Some(def) = ctx.responder.def().sensors.get(usize::from(index)) else {
        return Outcome::Nack(NackReason::DataOutOfRange);
    };
    ctx.writer.push_u8(index);
    ctx.writer.push_u8(def.kind as u8);
    ctx.writer.push_u8(def.unit as u8);
    ctx.writer.push_u8(def.prefix as u8);
    ctx.writer.push_i16(def.range_min);
    ctx.writer.push_i16(def.range_max);
    ctx.writer.push_i16(def.normal_min);
    ctx.writer.push_i16(def.normal_max);
    ctx.writer.push_u8(def.recorded.bits());
    ctx.writer.push_str(def.description);
    Outcome::Ack
}

fn push_sensor_values(ctx: &mut Context<'_, '_>, index: u8, data: model::SensorData) {
    ctx.writer.push_u8(index);
    ctx.writer.push_i16(data.present_value);
    ctx.writer.push_i16(data.lowest);
    ctx.writer.push_i16(data.highest);
    ctx.writer.push_i16(data.recorded);
}

fn get_sensor_value(ctx: &mut Context<'_, '_>) -> Outcome {
    let index = ctx.request.data[0];
    let Some(data) = ctx.responder.sensor_data(usize::from(index)).copied() else {
        return Outcome::Nack(NackReason::DataOutOfRange);
    };
    if data.should_nack {
        return Outcome::Nack(data.nack_reason);
    }
    push_sensor_values(ctx, index, data);
    Outcome::Ack
}

fn set_sensor_value(ctx: &mut Context<'_, '_>) -> Outcome {
    let [index] = ctx.request.data else {
        return Outcome::Nack(NackReason::FormatError);
    };
    if *index == ALL_SENSORS {
        for sensor in 0..ctx.responder.sensor_count() {
            ctx.responder.reset_sensor(sensor);
        }
        push_sensor_values(ctx, ALL_SENSORS, model::SensorData::new());
        return Outcome::Ack;
    }

    let index = *index;
    if usize::from(index) >= ctx.responder.sensor_count() {
        return Outcome::Nack(NackReason::DataOutOfRange);
    }
    ctx.responder.reset_sensor(usize::from(index));
    let data = ctx.responder.sensors[usize::from(index)];
    push_sensor_values(ctx, index, data);
    Outcome::Ack
}

fn set_record_sensors(ctx: &mut Context<'_, '_>) -> Outcome {
    let [index] = ctx.request.data else {
        return Outcome::Nack(NackReason::FormatError);
    };
    if *index == ALL_SENSORS {
        for sensor in 0..ctx.responder.sensor_count() {
            ctx.responder.record_sensor(sensor);
        }
        return Outcome::Ack;
    }
    if ctx.responder.record_sensor(usize::from(*index)) {
        Outcome::Ack
    } else {
        Outcome::Nack(NackReason::DataOutOfRange)
    }
}

fn get_identify_device(ctx: &mut Context<'_, '_>) -> Outcome {
    ctx.writer.push_u8(u8::from(ctx.responder.identify_on()));
    Outcome::Ack
}

fn set_identify_device(ctx: &mut Context<'_, '_>) -> Outcome {
    let [value] = ctx.request.data else {
        return Outcome::Nack(NackReason::FormatError);
    };
    if *value > 1 {
        return Outcome::Nack(NackReason::DataOutOfRange);
    }
    let on = *value == 1;
    if ctx.responder.identify_on != on {
        ctx.responder.identify_on = on;
        ctx.responder.using_factory_defaults = false;
    }
    Outcome::Ack
}

#[cfg(test)]
mod tests {
    use dataview::{DataView, PodMethods as _};
    use rdx_protocol::{
        CommandClass, ControlField, RdmHeader, ResponseType, codec, dub,
    };
    use rdx_types::{SubDevice, Uid};

    use super::*;
    use crate::{
        counters::ReceiverCounters,
        frame::{DispatchOutcome, FrameBuffer, RdmHandler as _},
        responder::{ResponderSet, model::fixtures::TEST_DEF},
    };

    const OWN_UID: Uid = Uid::new(0x7a70, 0x0000_0001);
    const HOST_UID: Uid = Uid::new(0x0001, 0x0000_0001);

    fn request_frame(
        dest: Uid,
        sub_device: u16,
        class: CommandClass,
        pid: u16,
        data: &[u8],
    ) -> FrameBuffer {
        let mut header = RdmHeader::new();
        header.set_dest_uid(dest);
        header.set_src_uid(HOST_UID);
        header.transaction_number = 0x31;
        header.port_id = 1;
        header.set_sub_device(SubDevice::new(sub_device));
        header.set_command_class(class);
        header.set_param_id(pid);
        header.param_data_length = u8::try_from(data.len()).unwrap();
        header.message_length = u8::try_from(RdmHeader::SIZE + data.len()).unwrap();

        let mut frame = FrameBuffer::new();
        let storage = frame.storage_mut();
        storage[..RdmHeader::SIZE].copy_from_slice(header.as_bytes());
        storage[RdmHeader::SIZE..RdmHeader::SIZE + data.len()].copy_from_slice(data);
        let total = codec::append_checksum(storage, RdmHeader::SIZE + data.len());
        frame.set_len(total);
        frame
    }

    fn dispatch(
        set: &mut ResponderSet<'_>,
        frame: &mut FrameBuffer,
        counters: &mut ReceiverCounters,
    ) -> DispatchOutcome {
        let outcome = set.dispatch(frame, counters);
        if let DispatchOutcome::Reply(len) = outcome {
            frame.set_len(len);
            // Every framed reply must itself validate.
            codec::validate(frame.as_slice()).unwrap();
        }
        outcome
    }

    fn reply_header(frame: &FrameBuffer) -> RdmHeader {
        *DataView::from(frame.as_slice()).get::<RdmHeader>(0)
    }

    fn reply_data(frame: &FrameBuffer) -> &[u8] {
        let header = DataView::from(frame.as_slice()).get::<RdmHeader>(0);
        &frame.as_slice()[RdmHeader::SIZE..usize::from(header.message_length)]
    }

    #[test]
    fn disc_mute_of_root() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::DiscoveryCommand,
            ParameterId::DiscMute as u16,
            &[],
        );

        let outcome = dispatch(&mut set, &mut frame, &mut counters);
        assert!(matches!(outcome, DispatchOutcome::Reply(_)));
        assert!(set.root().is_muted());

        let header = reply_header(&frame);
        assert_eq!(header.dest_uid(), HOST_UID);
        assert_eq!(header.src_uid(), OWN_UID);
        assert_eq!(header.transaction_number, 0x31);
        assert_eq!(header.sub_device(), SubDevice::ROOT);
        assert_eq!(header.command_class(), Some(CommandClass::DiscoveryResponse));
        assert_eq!(header.response_type(), Some(ResponseType::Ack));
        assert_eq!(reply_data(&frame), &[0x00, 0x00]);
    }

    #[test]
    fn mute_reply_reports_sub_devices() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        set.add_sub_device(&TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::DiscoveryCommand,
            ParameterId::DiscMute as u16,
            &[],
        );

        dispatch(&mut set, &mut frame, &mut counters);
        let control = u16::from_be_bytes([reply_data(&frame)[0], reply_data(&frame)[1]]);
        assert_eq!(
            ControlField::from_bits_truncate(control),
            ControlField::SUB_DEVICES_PRESENT
        );
    }

    #[test]
    fn broadcast_mute_is_silent_but_effective() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame = request_frame(
            Uid::ALL_DEVICES,
            0,
            CommandClass::DiscoveryCommand,
            ParameterId::DiscMute as u16,
            &[],
        );

        let outcome = dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(outcome, DispatchOutcome::NoResponse);
        assert!(set.root().is_muted());
    }

    #[test]
    fn dub_hit_emits_encoded_uid() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut data = [0; 12];
        data[..6].copy_from_slice(Uid::new(0x7a70, 0).as_bytes());
        data[6..].copy_from_slice(Uid::new(0x7a70, 2).as_bytes());
        let mut frame = request_frame(
            Uid::ALL_DEVICES,
            0,
            CommandClass::DiscoveryCommand,
            ParameterId::DiscUniqueBranch as u16,
            &data,
        );

        let outcome = dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(outcome, DispatchOutcome::RawDub(dub::DUB_RESPONSE_SIZE));
        frame.set_len(dub::DUB_RESPONSE_SIZE);
        assert_eq!(dub::decode(frame.as_slice()).unwrap(), OWN_UID);
    }

    #[test]
    fn dub_miss_stays_silent() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut data = [0; 12];
        data[..6].copy_from_slice(Uid::new(0x7a70, 0).as_bytes());
        data[6..].copy_from_slice(Uid::new(0x7a70, 0).as_bytes());
        let mut frame = request_frame(
            Uid::ALL_DEVICES,
            0,
            CommandClass::DiscoveryCommand,
            ParameterId::DiscUniqueBranch as u16,
            &data,
        );

        assert_eq!(
            dispatch(&mut set, &mut frame, &mut counters),
            DispatchOutcome::NoResponse
        );
    }

    #[test]
    fn dub_when_muted_stays_silent() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        set.root_mut().is_muted = true;
        let mut counters = ReceiverCounters::new();
        let mut data = [0; 12];
        data[..6].copy_from_slice(Uid::new(0x0000, 0).as_bytes());
        data[6..].copy_from_slice(Uid::ALL_DEVICES.as_bytes());
        let mut frame = request_frame(
            Uid::ALL_DEVICES,
            0,
            CommandClass::DiscoveryCommand,
            ParameterId::DiscUniqueBranch as u16,
            &data,
        );

        assert_eq!(
            dispatch(&mut set, &mut frame, &mut counters),
            DispatchOutcome::NoResponse
        );
    }

    #[test]
    fn root_only_parameter_dropped_for_sub_device() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        set.add_sub_device(&TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame = request_frame(
            OWN_UID,
            1,
            CommandClass::GetCommand,
            ParameterId::DmxStartAddress as u16,
            &[],
        );

        assert_eq!(
            dispatch(&mut set, &mut frame, &mut counters),
            DispatchOutcome::NoResponse
        );
    }

    #[test]
    fn set_start_address_out_of_range() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::SetCommand,
            ParameterId::DmxStartAddress as u16,
            &[0x02, 0x01],
        );

        dispatch(&mut set, &mut frame, &mut counters);
        let header = reply_header(&frame);
        assert_eq!(header.response_type(), Some(ResponseType::NackReason));
        assert_eq!(
            reply_data(&frame),
            &(NackReason::DataOutOfRange as u16).to_be_bytes()
        );
        assert_eq!(set.root().dmx_start_address(), 1);
        assert!(set.root().using_factory_defaults());
    }

    #[test]
    fn set_start_address_clears_factory_defaults() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::SetCommand,
            ParameterId::DmxStartAddress as u16,
            &[0x00, 0x2a],
        );

        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(set.root().dmx_start_address(), 42);
        assert!(!set.root().using_factory_defaults());

        // Setting the same value again is not a change.
        set.root_mut().reset_to_factory_defaults();
        set.root_mut().dmx_start_address = 42;
        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::SetCommand,
            ParameterId::DmxStartAddress as u16,
            &[0x00, 0x2a],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert!(set.root().using_factory_defaults());
    }

    #[test]
    fn broadcast_get_is_silent() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame = request_frame(
            Uid::all_devices_of(0x7a70),
            0,
            CommandClass::GetCommand,
            ParameterId::DeviceInfo as u16,
            &[],
        );

        assert_eq!(
            dispatch(&mut set, &mut frame, &mut counters),
            DispatchOutcome::NoResponse
        );
    }

    #[test]
    fn broadcast_set_executes_silently() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame = request_frame(
            Uid::ALL_DEVICES,
            0,
            CommandClass::SetCommand,
            ParameterId::IdentifyDevice as u16,
            &[1],
        );

        assert_eq!(
            dispatch(&mut set, &mut frame, &mut counters),
            DispatchOutcome::NoResponse
        );
        assert!(set.root().identify_on());
    }

    #[test]
    fn frames_for_other_devices_are_ignored() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame = request_frame(
            Uid::new(0x7a70, 0x0000_0099),
            0,
            CommandClass::GetCommand,
            ParameterId::DeviceInfo as u16,
            &[],
        );

        assert_eq!(
            dispatch(&mut set, &mut frame, &mut counters),
            DispatchOutcome::NoResponse
        );
    }

    #[test]
    fn unknown_pid_nacks() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame =
            request_frame(OWN_UID, 0, CommandClass::GetCommand, 0x7fe0, &[]);

        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(
            reply_data(&frame),
            &(NackReason::UnknownPid as u16).to_be_bytes()
        );
    }

    #[test]
    fn get_with_wrong_size_nacks_format_error() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::DeviceInfo as u16,
            &[0x01],
        );

        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(
            reply_data(&frame),
            &(NackReason::FormatError as u16).to_be_bytes()
        );
    }

    #[test]
    fn set_without_handler_nacks_unsupported_class() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::SetCommand,
            ParameterId::DeviceInfo as u16,
            &[],
        );

        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(
            reply_data(&frame),
            &(NackReason::UnsupportedCommandClass as u16).to_be_bytes()
        );
    }

    #[test]
    fn device_info_layout() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::DeviceInfo as u16,
            &[],
        );

        dispatch(&mut set, &mut frame, &mut counters);
        let data = reply_data(&frame);
        assert_eq!(data.len(), 19);
        assert_eq!(&data[0..2], &PROTOCOL_VERSION.to_be_bytes());
        assert_eq!(&data[2..4], &TEST_DEF.model_id.to_be_bytes());
        // Footprint of personality 1, current/count, address 1.
        assert_eq!(&data[10..12], &3_u16.to_be_bytes());
        assert_eq!(data[12], 1);
        assert_eq!(data[13], 2);
        assert_eq!(&data[14..16], &1_u16.to_be_bytes());
        assert_eq!(&data[16..18], &0_u16.to_be_bytes());
        assert_eq!(data[18], 1);
    }

    #[test]
    fn comms_status_reports_and_clears() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        counters.count_short_frame();
        counters.count_checksum_invalid();
        counters.count_checksum_invalid();

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::CommsStatus as u16,
            &[],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(reply_data(&frame), &[0, 1, 0, 0, 0, 2]);

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::SetCommand,
            ParameterId::CommsStatus as u16,
            &[],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(counters.short_frame(), 0);
        assert_eq!(counters.checksum_invalid(), 0);
    }

    #[test]
    fn queued_message_answers_as_status_messages() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::QueuedMessage as u16,
            &[StatusType::StatusError as u8],
        );

        dispatch(&mut set, &mut frame, &mut counters);
        let header = reply_header(&frame);
        assert_eq!(header.param_id(), ParameterId::StatusMessages as u16);
        assert_eq!(header.response_type(), Some(ResponseType::Ack));
        assert!(reply_data(&frame).is_empty());

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::QueuedMessage as u16,
            &[0x77],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(
            reply_data(&frame),
            &(NackReason::DataOutOfRange as u16).to_be_bytes()
        );
    }

    #[test]
    fn personality_round_trip() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::SetCommand,
            ParameterId::DmxPersonality as u16,
            &[2],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(set.root().current_personality(), 2);
        assert!(!set.root().using_factory_defaults());

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::DmxPersonality as u16,
            &[],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(reply_data(&frame), &[2, 2]);

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::SetCommand,
            ParameterId::DmxPersonality as u16,
            &[3],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(
            reply_data(&frame),
            &(NackReason::DataOutOfRange as u16).to_be_bytes()
        );
    }

    #[test]
    fn personality_description() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::DmxPersonalityDescription as u16,
            &[1],
        );

        dispatch(&mut set, &mut frame, &mut counters);
        let data = reply_data(&frame);
        assert_eq!(data[0], 1);
        assert_eq!(&data[1..3], &3_u16.to_be_bytes());
        assert_eq!(&data[3..], b"3 channel");
    }

    #[test]
    fn device_label_set_and_length_limit() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::SetCommand,
            ParameterId::DeviceLabel as u16,
            b"stage left dimmer",
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(set.root().device_label(), "stage left dimmer");
        assert!(!set.root().using_factory_defaults());

        let long = [b'x'; 33];
        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::SetCommand,
            ParameterId::DeviceLabel as u16,
            &long,
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(
            reply_data(&frame),
            &(NackReason::FormatError as u16).to_be_bytes()
        );
        assert_eq!(set.root().device_label(), "stage left dimmer");
    }

    #[test]
    fn factory_defaults_round_trip() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::SetCommand,
            ParameterId::DmxPersonality as u16,
            &[2],
        );
        dispatch(&mut set, &mut frame, &mut counters);

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::FactoryDefaults as u16,
            &[],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(reply_data(&frame), &[0]);

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::SetCommand,
            ParameterId::FactoryDefaults as u16,
            &[],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert!(set.root().using_factory_defaults());
        assert_eq!(set.root().current_personality(), 1);
    }

    #[test]
    fn slot_info_and_descriptions() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::SlotInfo as u16,
            &[],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        // Three slots, five bytes each.
        assert_eq!(reply_data(&frame).len(), 15);

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::SlotDescription as u16,
            &[0x00, 0x00],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(&reply_data(&frame)[2..], b"Intensity");

        // Slot 1 has no description.
        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::SlotDescription as u16,
            &[0x00, 0x01],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(
            reply_data(&frame),
            &(NackReason::DataOutOfRange as u16).to_be_bytes()
        );

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::DefaultSlotValue as u16,
            &[],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(reply_data(&frame), &[0, 0, 0, 0, 1, 0, 0, 2, 127]);
    }

    #[test]
    fn sensor_value_and_fault_injection() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        set.root_mut().set_sensor_value(0, 42);

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::SensorValue as u16,
            &[0],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        let data = reply_data(&frame);
        assert_eq!(data[0], 0);
        assert_eq!(&data[1..3], &42_i16.to_be_bytes());

        set.root_mut().sensor_data_mut(0).unwrap().should_nack = true;
        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::SensorValue as u16,
            &[0],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(
            reply_data(&frame),
            &(NackReason::HardwareFault as u16).to_be_bytes()
        );

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::SensorValue as u16,
            &[7],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(
            reply_data(&frame),
            &(NackReason::DataOutOfRange as u16).to_be_bytes()
        );
    }

    #[test]
    fn record_and_reset_sensors() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        set.root_mut().set_sensor_value(0, 55);

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::SetCommand,
            ParameterId::RecordSensors as u16,
            &[ALL_SENSORS],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(set.root().sensor_data(0).unwrap().recorded, 55);

        set.root_mut().set_sensor_value(0, 60);
        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::SetCommand,
            ParameterId::SensorValue as u16,
            &[0],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        let data = reply_data(&frame);
        assert_eq!(&data[3..5], &60_i16.to_be_bytes());
        assert_eq!(&data[5..7], &60_i16.to_be_bytes());
    }

    #[test]
    fn supported_parameters_excludes_discovery() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();
        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::SupportedParameters as u16,
            &[],
        );

        dispatch(&mut set, &mut frame, &mut counters);
        let data = reply_data(&frame);
        let pids: std::vec::Vec<u16> = data
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        assert!(pids.contains(&(ParameterId::DeviceLabel as u16)));
        assert!(pids.contains(&(ParameterId::SensorValue as u16)));
        assert!(!pids.contains(&(ParameterId::DiscUniqueBranch as u16)));
        assert!(!pids.contains(&(ParameterId::DiscMute as u16)));
    }

    #[test]
    fn sub_device_routing() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        let mut counters = ReceiverCounters::new();

        // No sub-devices yet.
        let mut frame = request_frame(
            OWN_UID,
            1,
            CommandClass::GetCommand,
            ParameterId::DeviceLabel as u16,
            &[],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(
            reply_data(&frame),
            &(NackReason::SubDeviceOutOfRange as u16).to_be_bytes()
        );

        set.add_sub_device(&TEST_DEF);
        let mut frame = request_frame(
            OWN_UID,
            1,
            CommandClass::SetCommand,
            ParameterId::DeviceLabel as u16,
            b"sub one",
        );
        dispatch(&mut set, &mut frame, &mut counters);
        let header = reply_header(&frame);
        assert_eq!(header.sub_device(), SubDevice::new(1));
        assert_eq!(set.sub_device(1).unwrap().device_label(), "sub one");
        assert_eq!(set.root().device_label(), "test widget");
    }

    #[test]
    fn reply_message_count_comes_from_the_addressed_responder() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        set.add_sub_device(&TEST_DEF);
        set.root_mut().queued_message_count = 2;
        set.subs[0].queued_message_count = 5;
        let mut counters = ReceiverCounters::new();

        let mut frame = request_frame(
            OWN_UID,
            0,
            CommandClass::GetCommand,
            ParameterId::DeviceLabel as u16,
            &[],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(reply_header(&frame).message_count, 2);

        let mut frame = request_frame(
            OWN_UID,
            1,
            CommandClass::GetCommand,
            ParameterId::DeviceLabel as u16,
            &[],
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(reply_header(&frame).message_count, 5);

        let mut frame = request_frame(
            OWN_UID,
            1,
            CommandClass::SetCommand,
            ParameterId::DeviceLabel as u16,
            b"aft truss",
        );
        dispatch(&mut set, &mut frame, &mut counters);
        assert_eq!(reply_header(&frame).message_count, 5);
    }

    #[test]
    fn all_call_set_touches_every_sub_device() {
        let mut set = ResponderSet::new(OWN_UID, &TEST_DEF);
        set.add_sub_device(&TEST_DEF);
        set.add_sub_device(&TEST_DEF);
        let mut counters = ReceiverCounters::new();

        let mut frame = request_frame(
            OWN_UID,
            0xffff,
            CommandClass::SetCommand,
            ParameterId::DeviceLabel as u16,
            b"renamed",
        );
        dispatch(&mut set, &mut frame, &mut counters);
        let header = reply_header(&frame);
        assert_eq!(header.sub_device(), SubDevice::ALL_CALL);
        assert_eq!(set.sub_device(1).unwrap().device_label(), "renamed");
        assert_eq!(set.sub_device(2).unwrap().device_label(), "renamed");
        assert_eq!(set.root().device_label(), "test widget");
    }

    #[test]
    fn pid_table_is_sorted_for_binary_search() {
        for window in PID_TABLE.windows(2) {
            assert!((window[0].pid as u16) < (window[1].pid as u16));
        }
        assert!(lookup(ParameterId::DeviceInfo as u16).is_some());
        assert!(lookup(0x0001).is_none());
    }
}
