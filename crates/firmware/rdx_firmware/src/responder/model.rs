//! The responder device model: the static definition a product ships with
//! and the mutable per-responder state layered on top of it.

use arrayvec::ArrayString;
use rdx_protocol::{
    INVALID_DMX_START_ADDRESS, MAX_DMX_SLOTS, NackReason,
    sensor::{RecordedSupport, SENSOR_VALUE_UNSUPPORTED, SensorPrefix, SensorType, SensorUnit},
    slot::SlotType,
};
use rdx_types::SubDevice;

/// Most sensors a definition may carry.
pub const MAX_SENSORS: usize = 8;
/// Most sub-devices a device may expose.
pub const MAX_SUB_DEVICES: usize = 4;
/// Most product detail ids reported by PRODUCT_DETAIL_ID_LIST.
pub const MAX_PRODUCT_DETAILS: usize = 6;
/// Longest settable device label.
pub const DEVICE_LABEL_MAX_LEN: usize = 32;

/// One slot of a personality footprint.
#[derive(Debug, Clone, Copy)]
pub struct SlotDef<'a> {
    pub slot_type: SlotType,
    pub label_id: u16,
    pub default_value: u8,
    pub description: Option<&'a str>,
}

/// One operating mode of the device.
#[derive(Debug, Clone, Copy)]
pub struct Personality<'a> {
    pub description: &'a str,
    pub slots: &'a [SlotDef<'a>],
}

impl Personality<'_> {
    /// Number of DMX slots the personality occupies.
    #[must_use]
    pub fn footprint(&self) -> usize {
        self.slots.len()
    }
}

/// Static description of one sensor.
#[derive(Debug, Clone, Copy)]
pub struct SensorDef<'a> {
    pub kind: SensorType,
    pub unit: SensorUnit,
    pub prefix: SensorPrefix,
    pub range_min: i16,
    pub range_max: i16,
    pub normal_min: i16,
    pub normal_max: i16,
    pub recorded: RecordedSupport,
    pub description: &'a str,
}

/// Live state of one sensor.
#[derive(Debug, Clone, Copy)]
pub struct SensorData {
    pub present_value: i16,
    pub lowest: i16,
    pub highest: i16,
    pub recorded: i16,
    /// Simulated fault injection: when set, GET SENSOR_VALUE answers with
    /// `nack_reason` instead of a reading.
    pub should_nack: bool,
    pub nack_reason: NackReason,
}

impl SensorData {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            present_value: 0,
            lowest: SENSOR_VALUE_UNSUPPORTED,
            highest: SENSOR_VALUE_UNSUPPORTED,
            recorded: SENSOR_VALUE_UNSUPPORTED,
            should_nack: false,
            nack_reason: NackReason::HardwareFault,
        }
    }
}

impl Default for SensorData {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything about a product that never changes at runtime.
#[derive(Debug, Clone, Copy)]
pub struct ResponderDef<'a> {
    pub model_id: u16,
    pub model_description: &'a str,
    pub manufacturer_label: &'a str,
    pub software_version: u32,
    pub software_version_label: &'a str,
    pub boot_software_version: u32,
    pub boot_software_version_label: &'a str,
    pub product_category: u16,
    pub product_detail_ids: &'a [u16],
    pub default_device_label: &'a str,
    pub default_personality: u8,
    pub default_dmx_start_address: u16,
    pub personalities: &'a [Personality<'a>],
    pub sensors: &'a [SensorDef<'a>],
    pub is_managed_proxy: bool,
    pub is_proxied_device: bool,
}

/// Mutable state of one logical responder (the root device or one
/// sub-device; both have the same shape).
pub struct Responder<'d> {
    def: &'d ResponderDef<'d>,
    sub_device_id: SubDevice,
    pub(crate) is_muted: bool,
    pub(crate) identify_on: bool,
    pub(crate) using_factory_defaults: bool,
    /// 1-based, always within `def.personalities`.
    pub(crate) current_personality: u8,
    pub(crate) dmx_start_address: u16,
    pub(crate) queued_message_count: u8,
    pub(crate) device_label: ArrayString<DEVICE_LABEL_MAX_LEN>,
    pub(crate) sensors: [SensorData; MAX_SENSORS],
}

impl<'d> Responder<'d> {
    #[must_use]
    pub fn new(def: &'d ResponderDef<'d>, sub_device_id: SubDevice) -> Self {
        debug_assert!(!def.personalities.is_empty());
        debug_assert!(usize::from(def.default_personality) <= def.personalities.len());
        debug_assert!(def.sensors.len() <= MAX_SENSORS);

        let mut responder = Self {
            def,
            sub_device_id,
            is_muted: false,
            identify_on: false,
            using_factory_defaults: true,
            current_personality: 1,
            dmx_start_address: 1,
            queued_message_count: 0,
            device_label: ArrayString::new(),
            sensors: [SensorData::new(); MAX_SENSORS],
        };
        responder.reset_to_factory_defaults();
        responder
    }

    #[must_use]
    pub fn def(&self) -> &'d ResponderDef<'d> {
        self.def
    }

    #[must_use]
    pub fn sub_device_id(&self) -> SubDevice {
        self.sub_device_id
    }

    #[must_use]
    pub fn is_sub_device(&self) -> bool {
        !self.sub_device_id.is_root()
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.is_muted
    }

    #[must_use]
    pub fn identify_on(&self) -> bool {
        self.identify_on
    }

    #[must_use]
    pub fn using_factory_defaults(&self) -> bool {
        self.using_factory_defaults
    }

    /// 1-based index of the active personality.
    #[must_use]
    pub fn current_personality(&self) -> u8 {
        self.current_personality
    }

    #[must_use]
    pub fn personality(&self) -> &'d Personality<'d> {
        &self.def.personalities[usize::from(self.current_personality) - 1]
    }

    /// DMX footprint of the active personality.
    #[must_use]
    pub fn footprint(&self) -> usize {
        self.personality().footprint()
    }

    /// Configured start address, regardless of footprint.
    #[must_use]
    pub fn dmx_start_address(&self) -> u16 {
        self.dmx_start_address
    }

    /// Start address as reported on the wire: the invalid marker when the
    /// active personality occupies no slots.
    #[must_use]
    pub fn effective_dmx_start_address(&self) -> u16 {
        if self.footprint() == 0 {
            INVALID_DMX_START_ADDRESS
        } else {
            self.dmx_start_address
        }
    }

    #[must_use]
    pub fn device_label(&self) -> &str {
        &self.device_label
    }

    #[must_use]
    pub fn queued_message_count(&self) -> u8 {
        self.queued_message_count
    }

    #[must_use]
    pub fn sensor_count(&self) -> usize {
        self.def.sensors.len()
    }

    #[must_use]
    pub fn sensor_data(&self, index: usize) -> Option<&SensorData> {
        (index < self.sensor_count()).then(|| &self.sensors[index])
    }

    #[must_use]
    pub fn sensor_data_mut(&mut self, index: usize) -> Option<&mut SensorData> {
        (index < self.sensor_count()).then(|| &mut self.sensors[index])
    }

    /// Feeds a new reading into a sensor, updating the lowest/highest
    /// trackers when the definition supports them. This is the platform's
    /// entry point for real measurements.
    pub fn set_sensor_value(&mut self, index: usize, value: i16) {
        let Some(def) = self.def.sensors.get(index) else {
            return;
        };
        let tracks = def.recorded.contains(RecordedSupport::LOWEST_HIGHEST);
        let data = &mut self.sensors[index];
        data.present_value = value;
        if tracks {
            data.lowest = data.lowest.min(value);
            data.highest = data.highest.max(value);
        }
    }

    /// Snapshots the present value into the recorded slot, when supported.
    /// Returns `false` for sensors without recording support.
    pub(crate) fn record_sensor(&mut self, index: usize) -> bool {
        let Some(def) = self.def.sensors.get(index) else {
            return false;
        };
        if !def.recorded.contains(RecordedSupport::RECORDED_VALUE) {
            return false;
        }
        let data = &mut self.sensors[index];
        data.recorded = data.present_value;
        true
    }

    /// Resets lowest/highest/recorded to the present value (or the
    /// unsupported marker where the definition does not track them).
    pub(crate) fn reset_sensor(&mut self, index: usize) {
        let Some(def) = self.def.sensors.get(index) else {
            return;
        };
        let data = &mut self.sensors[index];
        if def.recorded.contains(RecordedSupport::LOWEST_HIGHEST) {
            data.lowest = data.present_value;
            data.highest = data.present_value;
        } else {
            data.lowest = SENSOR_VALUE_UNSUPPORTED;
            data.highest = SENSOR_VALUE_UNSUPPORTED;
        }
        if def.recorded.contains(RecordedSupport::RECORDED_VALUE) {
            data.recorded = data.present_value;
        } else {
            data.recorded = SENSOR_VALUE_UNSUPPORTED;
        }
    }

    /// Returns every mutable field to its definition default and raises the
    /// factory-defaults flag.
    pub fn reset_to_factory_defaults(&mut self) {
        self.is_muted = false;
        self.identify_on = false;
        self.current_personality = self.def.default_personality.clamp(1, {
            let count = self.def.personalities.len();
            u8::try_from(count).unwrap_or(u8::MAX)
        });
        self.dmx_start_address = self
            .def
            .default_dmx_start_address
            .clamp(1, u16::try_from(MAX_DMX_SLOTS).unwrap_or(u16::MAX));
        self.queued_message_count = 0;
        self.device_label = clamp_label(self.def.default_device_label);
        for index in 0..self.sensor_count() {
            self.sensors[index] = SensorData::new();
            self.reset_sensor(index);
        }
        self.using_factory_defaults = true;
    }
}

/// Truncates a definition label to the wire limit, respecting UTF-8
/// boundaries.
pub(crate) fn clamp_label(label: &str) -> ArrayString<DEVICE_LABEL_MAX_LEN> {
    let mut end = label.len().min(DEVICE_LABEL_MAX_LEN);
    while !label.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = ArrayString::new();
    out.push_str(&label[..end]);
    out
}

#[cfg(test)]
pub(crate) mod fixtures {
    use rdx_protocol::slot::labels;

    use super::*;

    pub(crate) static TEST_SLOTS: [SlotDef<'static>; 3] = [
        SlotDef {
            slot_type: SlotType::Primary,
            label_id: labels::INTENSITY,
            default_value: 0,
            description: Some("Intensity"),
        },
        SlotDef {
            slot_type: SlotType::SecondaryFine,
            label_id: labels::INTENSITY,
            default_value: 0,
            description: None,
        },
        SlotDef {
            slot_type: SlotType::Primary,
            label_id: labels::PAN,
            default_value: 127,
            description: Some("Pan"),
        },
    ];

    pub(crate) static TEST_DEF: ResponderDef<'static> = ResponderDef {
        model_id: 0x0102,
        model_description: "Test Widget",
        manufacturer_label: "Open Lighting",
        software_version: 0x0100_0000,
        software_version_label: "1.0.0",
        boot_software_version: 1,
        boot_software_version_label: "boot 1.0",
        product_category: rdx_protocol::product::CATEGORY_TEST_EQUIPMENT,
        product_detail_ids: &[rdx_protocol::product::DETAIL_LED],
        default_device_label: "test widget",
        default_personality: 1,
        default_dmx_start_address: 1,
        personalities: &[
            Personality {
                description: "3 channel",
                slots: &TEST_SLOTS,
            },
            Personality {
                description: "no slots",
                slots: &[],
            },
        ],
        sensors: &[SensorDef {
            kind: SensorType::Temperature,
            unit: SensorUnit::Centigrade,
            prefix: SensorPrefix::None,
            range_min: -40,
            range_max: 120,
            normal_min: 0,
            normal_max: 80,
            recorded: RecordedSupport::all(),
            description: "board temperature",
        }],
        is_managed_proxy: false,
        is_proxied_device: false,
    };
}

#[cfg(test)]
mod tests {
    use super::{fixtures::TEST_DEF, *};

    #[test]
    fn factory_defaults_restore_everything() {
        let mut responder = Responder::new(&TEST_DEF, SubDevice::ROOT);
        responder.is_muted = true;
        responder.identify_on = true;
        responder.current_personality = 2;
        responder.dmx_start_address = 100;
        responder.device_label = clamp_label("renamed");
        responder.using_factory_defaults = false;

        responder.reset_to_factory_defaults();
        assert!(!responder.is_muted());
        assert!(!responder.identify_on());
        assert_eq!(responder.current_personality(), 1);
        assert_eq!(responder.dmx_start_address(), 1);
        assert_eq!(responder.device_label(), "test widget");
        assert!(responder.using_factory_defaults());
    }

    #[test]
    fn effective_address_tracks_footprint() {
        let mut responder = Responder::new(&TEST_DEF, SubDevice::ROOT);
        assert_eq!(responder.footprint(), 3);
        assert_eq!(responder.effective_dmx_start_address(), 1);

        responder.current_personality = 2;
        assert_eq!(responder.footprint(), 0);
        assert_eq!(
            responder.effective_dmx_start_address(),
            INVALID_DMX_START_ADDRESS
        );
    }

    #[test]
    fn sensor_tracking_follows_support_flags() {
        let mut responder = Responder::new(&TEST_DEF, SubDevice::ROOT);
        responder.set_sensor_value(0, 21);
        responder.set_sensor_value(0, 35);
        responder.set_sensor_value(0, -5);

        let data = responder.sensor_data(0).unwrap();
        assert_eq!(data.present_value, -5);
        assert_eq!(data.lowest, -5);
        assert_eq!(data.highest, 35);

        assert!(responder.record_sensor(0));
        assert_eq!(responder.sensor_data(0).unwrap().recorded, -5);

        responder.set_sensor_value(0, 10);
        responder.reset_sensor(0);
        let data = responder.sensor_data(0).unwrap();
        assert_eq!(data.lowest, 10);
        assert_eq!(data.highest, 10);
        assert_eq!(data.recorded, 10);
    }

    #[test]
    fn label_clamps_to_wire_limit() {
        let long = "a very long device label that overflows the limit";
        assert_eq!(clamp_label(long).len(), DEVICE_LABEL_MAX_LEN);
        assert_eq!(clamp_label("short"), *"short");
    }
}
