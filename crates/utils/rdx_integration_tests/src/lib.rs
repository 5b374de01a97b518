//! Shared harness for the end-to-end transceiver/responder scenarios.
//!
//! The [`MockHal`] stands in for the board: it keeps a fake microsecond
//! clock, records pin and UART activity, and turns `arm_timer` calls into
//! absolute deadlines the tests fire explicitly. The [`Harness`] wires a
//! real [`Transceiver`] and [`ResponderSet`] to it and collects upstream
//! events in owned form.

use dataview::PodMethods as _;
use rdx_firmware::{
    BusDirection, CoarseTimer, Edge, Event, FrameClass, Hal, Mode, OpResult, ReceiverCounters,
    Token, Transceiver, UartStatus,
    responder::{Personality, Responder, ResponderDef, ResponderSet, SensorDef, SlotDef},
};
use rdx_protocol::{
    CommandClass, RdmHeader, codec,
    sensor::{RecordedSupport, SensorPrefix, SensorType, SensorUnit},
    slot::{SlotType, labels},
};
use rdx_types::{SubDevice, Uid};

/// The UID used for the device under test.
pub const DEVICE_UID: Uid = Uid::new(0x7a70, 0x0000_0001);
/// The UID the simulated host/controller sends from.
pub const HOST_UID: Uid = Uid::new(0x0001, 0x0000_0001);

static DEMO_SLOTS: [SlotDef<'static>; 3] = [
    SlotDef {
        slot_type: SlotType::Primary,
        label_id: labels::INTENSITY,
        default_value: 0,
        description: Some("Intensity"),
    },
    SlotDef {
        slot_type: SlotType::Primary,
        label_id: labels::PAN,
        default_value: 127,
        description: Some("Pan"),
    },
    SlotDef {
        slot_type: SlotType::Primary,
        label_id: labels::TILT,
        default_value: 127,
        description: Some("Tilt"),
    },
];

/// The device model every scenario runs against.
pub static DEMO_DEF: ResponderDef<'static> = ResponderDef {
    model_id: 0x0200,
    model_description: "RDX USB Interface",
    manufacturer_label: "Open Lighting",
    software_version: 0x0003_0001,
    software_version_label: "0.3.1",
    boot_software_version: 2,
    boot_software_version_label: "boot 0.2",
    product_category: rdx_protocol::product::CATEGORY_TEST_EQUIPMENT,
    product_detail_ids: &[rdx_protocol::product::DETAIL_LED],
    default_device_label: "rdx device",
    default_personality: 1,
    default_dmx_start_address: 1,
    personalities: &[
        Personality {
            description: "3 channel",
            slots: &DEMO_SLOTS,
        },
        Personality {
            description: "passive",
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
        normal_max: 85,
        recorded: RecordedSupport::all(),
        description: "board temperature",
    }],
    is_managed_proxy: false,
    is_proxied_device: false,
};

/// Scripted board stand-in.
#[derive(Debug, Default)]
pub struct MockHal {
    /// Fake free-running microsecond counter.
    pub clock: u32,
    pub direction: Option<BusDirection>,
    pub break_active: bool,
    /// Absolute deadline of the armed one-shot timer.
    pub timer_deadline: Option<u32>,
    /// Everything written into the transmit FIFO, in order.
    pub tx_bytes: Vec<u8>,
    pub rx_flushes: usize,
    pub identify_led: bool,
    pub mute_led: bool,
    /// History of identify pin writes, for cadence checks.
    pub identify_history: Vec<bool>,
    pub mute_history: Vec<bool>,
}

impl Hal for MockHal {
    fn now(&self) -> u32 {
        self.clock
    }

    fn set_direction(&mut self, direction: BusDirection) {
        self.direction = Some(direction);
    }

    fn drive_break(&mut self, active: bool) {
        self.break_active = active;
    }

    fn arm_timer(&mut self, micros: u32) {
        self.timer_deadline = Some(self.clock.wrapping_add(micros));
    }

    fn disarm_timer(&mut self) {
        self.timer_deadline = None;
    }

    fn uart_write(&mut self, bytes: &[u8]) -> usize {
        self.tx_bytes.extend_from_slice(bytes);
        bytes.len()
    }

    fn flush_rx(&mut self) {
        self.rx_flushes += 1;
    }

    fn set_identify_led(&mut self, on: bool) {
        self.identify_led = on;
        self.identify_history.push(on);
    }

    fn set_mute_led(&mut self, on: bool) {
        self.mute_led = on;
        self.mute_history.push(on);
    }
}

/// An upstream event with its data copied out of the engine buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedEvent {
    Completion {
        token: Token,
        class: FrameClass,
        result: OpResult,
        data: Vec<u8>,
    },
    ModeChanged {
        token: Token,
        mode: Mode,
    },
}

/// One device under test: engine, responder model and scripted board.
pub struct Harness {
    pub hal: MockHal,
    pub engine: Transceiver,
    pub responders: ResponderSet<'static>,
    pub timer: CoarseTimer,
    pub events: Vec<OwnedEvent>,
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        Self {
            hal: MockHal::default(),
            engine: Transceiver::new(),
            responders: ResponderSet::new(DEVICE_UID, &DEMO_DEF),
            timer: CoarseTimer::new(),
            events: Vec::new(),
        }
    }

    /// A harness already switched into responder mode.
    #[must_use]
    pub fn responder() -> Self {
        let mut harness = Self::new();
        harness.engine.set_mode(&mut harness.hal, Mode::Responder, 0);
        harness.run_tasks();
        harness.events.clear();
        harness
    }

    /// One foreground pass; collected events land in `self.events`.
    pub fn run_tasks(&mut self) {
        let events = &mut self.events;
        let mut sink = |event: Event<'_>| {
            events.push(match event {
                Event::Completion {
                    token,
                    class,
                    result,
                    data,
                } => OwnedEvent::Completion {
                    token,
                    class,
                    result,
                    data: data.to_vec(),
                },
                Event::ModeChanged { token, mode } => OwnedEvent::ModeChanged { token, mode },
            });
        };
        self.engine
            .tasks(&mut self.hal, &mut self.responders, &mut sink);
    }

    /// Jumps the clock to the armed deadline and fires the one-shot timer.
    ///
    /// # Panics
    ///
    /// Panics if no timer is armed.
    pub fn fire_timer(&mut self) {
        let deadline = self.hal.timer_deadline.take().expect("no timer armed");
        self.hal.clock = deadline;
        self.engine.on_timer(&mut self.hal);
    }

    /// Puts a break of `duration` µs on the bus, starting now.
    pub fn send_break(&mut self, duration: u32) {
        let fall = self.hal.clock;
        self.engine.on_bus_edge(&mut self.hal, Edge::Falling, fall);
        self.hal.clock = fall.wrapping_add(duration);
        let rise = self.hal.clock;
        self.engine.on_bus_edge(&mut self.hal, Edge::Rising, rise);
    }

    /// Delivers frame bytes as clean UART receive traffic.
    pub fn feed_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.engine
                .on_rx_byte(&mut self.hal, *byte, UartStatus::empty());
        }
    }

    /// Runs a full request/dispatch cycle in responder mode: break, slots,
    /// foreground dispatch. Returns without driving any staged reply.
    pub fn receive_frame(&mut self, frame: &[u8]) {
        self.send_break(176);
        self.feed_bytes(frame);
        if self.hal.timer_deadline.is_some() {
            // Frames without a self-describing length end on the inter-slot
            // timeout.
            self.fire_timer();
        }
        self.run_tasks();
    }

    /// Drives a staged framed reply out of the device and returns the bytes
    /// it put on the wire (break and mark are consumed, not returned).
    pub fn collect_reply(&mut self) -> Vec<u8> {
        self.hal.tx_bytes.clear();
        // Turnaround delay, break, mark.
        self.fire_timer();
        assert!(self.hal.break_active);
        self.fire_timer();
        self.fire_timer();
        self.engine.on_tx_complete(&mut self.hal);
        self.hal.tx_bytes.clone()
    }

    /// Drives a staged raw discovery reply out of the device (no break, no
    /// mark) and returns the bytes.
    pub fn collect_dub_reply(&mut self) -> Vec<u8> {
        self.hal.tx_bytes.clear();
        // Turnaround delay only.
        self.fire_timer();
        assert!(!self.hal.break_active);
        self.engine.on_tx_complete(&mut self.hal);
        self.hal.tx_bytes.clone()
    }

    /// Advances the coarse timer by `ticks` and runs the LED cadence pass.
    pub fn advance_ticks(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.timer.tick();
        }
        self.responders.tasks(&self.timer, &mut self.hal);
    }

    #[must_use]
    pub fn counters(&self) -> &ReceiverCounters {
        self.engine.counters()
    }

    #[must_use]
    pub fn root(&self) -> &Responder<'static> {
        self.responders.root()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a complete RDM request frame, checksum included.
#[must_use]
pub fn rdm_request(
    dest: Uid,
    sub_device: u16,
    class: CommandClass,
    pid: u16,
    transaction_number: u8,
    data: &[u8],
) -> Vec<u8> {
    let mut header = RdmHeader::new();
    header.set_dest_uid(dest);
    header.set_src_uid(HOST_UID);
    header.transaction_number = transaction_number;
    header.port_id = 1;
    header.set_sub_device(SubDevice::new(sub_device));
    header.set_command_class(class);
    header.set_param_id(pid);
    header.param_data_length = u8::try_from(data.len()).expect("parameter data too long");
    header.message_length = u8::try_from(RdmHeader::SIZE + data.len()).expect("frame too long");

    let mut frame = vec![0; RdmHeader::SIZE + data.len() + 2];
    frame[..RdmHeader::SIZE].copy_from_slice(header.as_bytes());
    frame[RdmHeader::SIZE..RdmHeader::SIZE + data.len()].copy_from_slice(data);
    codec::append_checksum(&mut frame, RdmHeader::SIZE + data.len());
    frame
}

/// Builds a DISC_UNIQUE_BRANCH request covering `lower..=upper`.
#[must_use]
pub fn dub_request(lower: Uid, upper: Uid, transaction_number: u8) -> Vec<u8> {
    let mut data = [0; 12];
    data[..6].copy_from_slice(lower.as_bytes());
    data[6..].copy_from_slice(upper.as_bytes());
    rdm_request(
        Uid::ALL_DEVICES,
        0,
        CommandClass::DiscoveryCommand,
        rdx_protocol::ParameterId::DiscUniqueBranch as u16,
        transaction_number,
        &data,
    )
}

/// Splits a validated reply into its header and parameter data.
///
/// # Panics
///
/// Panics if the bytes do not validate as an RDM frame.
#[must_use]
pub fn parse_reply(bytes: &[u8]) -> (RdmHeader, Vec<u8>) {
    let header = *codec::validate(bytes).expect("reply does not validate");
    let data = bytes[RdmHeader::SIZE..usize::from(header.message_length)].to_vec();
    (header, data)
}
