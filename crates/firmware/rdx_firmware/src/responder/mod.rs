//! The RDM responder: parameter dispatch, reply assembly, discovery and
//! the indicator LEDs.
//!
//! The transceiver hands every validated RDM frame to
//! [`ResponderSet::dispatch`] through the [`RdmHandler`] seam. Dispatch
//! resolves the addressed logical responder (root or sub-device), runs the
//! parameter handler from the descriptor table and assembles the reply in
//! place in the shared frame buffer. The returned [`DispatchOutcome`] length
//! is the buffer hand-off token back to the transceiver.

mod handlers;
mod model;

use arrayvec::ArrayVec;
use dataview::{DataView, PodMethods as _};
use log::{debug, trace};
use rdx_protocol::{
    CommandClass, ControlField, MAX_PARAM_DATA_LENGTH, NackReason, ParameterId, RdmHeader,
    ResponseType,
    codec::{self, MessageWriter},
    dub,
};
use rdx_types::{SubDevice, Uid};

pub use self::model::{
    DEVICE_LABEL_MAX_LEN, MAX_PRODUCT_DETAILS, MAX_SENSORS, MAX_SUB_DEVICES, Personality,
    Responder, ResponderDef, SensorData, SensorDef, SlotDef,
};
use crate::{
    counters::ReceiverCounters,
    frame::{DispatchOutcome, FrameBuffer, RdmHandler},
    hal::Hal,
    ticks::{CoarseTimer, Ticks},
};

/// Identify LED toggle period while identify is on: 100 ticks, 1.0 s.
pub const FLASH_FAST_TICKS: u32 = 100;
/// Mute LED toggle period while unmuted: 1000 ticks, 10.0 s.
pub const FLASH_SLOW_TICKS: u32 = 1000;

/// A decoded request, with the parameter data copied out of the shared
/// buffer so handlers may overwrite it with their reply.
pub(crate) struct Request<'a> {
    pub(crate) header: RdmHeader,
    pub(crate) data: &'a [u8],
    pub(crate) is_unicast: bool,
}

/// What a parameter handler decided.
pub(crate) enum Outcome {
    /// Acknowledge; the reply parameter data is in the context writer.
    Ack,
    Nack(NackReason),
    NoResponse,
}

/// Everything a parameter handler may touch.
pub(crate) struct Context<'a, 'd> {
    pub(crate) responder: &'a mut Responder<'d>,
    pub(crate) request: &'a Request<'a>,
    pub(crate) writer: MessageWriter<'a>,
    pub(crate) counters: &'a mut ReceiverCounters,
    pub(crate) sub_device_count: u16,
    /// Set when the reply must carry a different parameter id than the
    /// request (QUEUED_MESSAGE answers as STATUS_MESSAGES).
    pub(crate) reply_param_id: Option<ParameterId>,
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Root,
    Sub(usize),
    AllSubs,
}

#[derive(Debug, Clone, Copy, Default)]
struct LedState {
    identify_seen: bool,
    identify_pin: bool,
    identify_at: Ticks,
    muted_seen: bool,
    mute_pin: bool,
    mute_at: Ticks,
}

/// The root responder plus any sub-devices, all sharing one UID on the
/// bus.
pub struct ResponderSet<'d> {
    uid: Uid,
    root: Responder<'d>,
    subs: ArrayVec<Responder<'d>, MAX_SUB_DEVICES>,
    led: LedState,
}

impl<'d> ResponderSet<'d> {
    #[must_use]
    pub fn new(uid: Uid, def: &'d ResponderDef<'d>) -> Self {
        Self {
            uid,
            root: Responder::new(def, SubDevice::ROOT),
            subs: ArrayVec::new(),
            led: LedState::default(),
        }
    }

    /// Adds one sub-device built from `def`; returns `false` once
    /// [`MAX_SUB_DEVICES`] are present.
    pub fn add_sub_device(&mut self, def: &'d ResponderDef<'d>) -> bool {
        let id = SubDevice::new(u16::try_from(self.subs.len() + 1).unwrap_or(u16::MAX));
        self.subs.try_push(Responder::new(def, id)).is_ok()
    }

    #[must_use]
    pub fn uid(&self) -> Uid {
        self.uid
    }

    #[must_use]
    pub fn root(&self) -> &Responder<'d> {
        &self.root
    }

    #[must_use]
    pub fn root_mut(&mut self) -> &mut Responder<'d> {
        &mut self.root
    }

    #[must_use]
    pub fn sub_device_count(&self) -> u16 {
        u16::try_from(self.subs.len()).unwrap_or(u16::MAX)
    }

    #[must_use]
    pub fn sub_device(&self, id: u16) -> Option<&Responder<'d>> {
        self.subs.get(usize::from(id).checked_sub(1)?)
    }

    /// LED cadence pass: identify blinks at [`FLASH_FAST_TICKS`] while
    /// identify is on; the mute indicator blinks at [`FLASH_SLOW_TICKS`]
    /// while unmuted and is held solid off while muted. Mute and identify
    /// state changes restart the respective phase.
    pub fn tasks<H: Hal>(&mut self, timer: &CoarseTimer, hal: &mut H) {
        if self.led.identify_seen != self.root.identify_on {
            self.led.identify_seen = self.root.identify_on;
            self.led.identify_pin = self.root.identify_on;
            self.led.identify_at = timer.now();
            hal.set_identify_led(self.led.identify_pin);
        } else if self.root.identify_on && timer.has_elapsed(self.led.identify_at, FLASH_FAST_TICKS)
        {
            self.led.identify_pin = !self.led.identify_pin;
            self.led.identify_at = timer.now();
            hal.set_identify_led(self.led.identify_pin);
        }

        if self.led.muted_seen != self.root.is_muted {
            self.led.muted_seen = self.root.is_muted;
            self.led.mute_pin = !self.root.is_muted;
            self.led.mute_at = timer.now();
            hal.set_mute_led(self.led.mute_pin);
        } else if !self.root.is_muted && timer.has_elapsed(self.led.mute_at, FLASH_SLOW_TICKS) {
            self.led.mute_pin = !self.led.mute_pin;
            self.led.mute_at = timer.now();
            hal.set_mute_led(self.led.mute_pin);
        }
    }

    fn target(&self, sub: SubDevice) -> Result<Target, NackReason> {
        if sub.is_root() {
            Ok(Target::Root)
        } else if sub.is_all_call() {
            if self.subs.is_empty() {
                Err(NackReason::SubDeviceOutOfRange)
            } else {
                Ok(Target::AllSubs)
            }
        } else if usize::from(sub.value()) <= self.subs.len() {
            Ok(Target::Sub(usize::from(sub.value()) - 1))
        } else {
            Err(NackReason::SubDeviceOutOfRange)
        }
    }

    fn dispatch_discovery(
        &mut self,
        request: &Request<'_>,
        frame: &mut FrameBuffer,
    ) -> DispatchOutcome {
        match request.header.parameter_id() {
            Some(ParameterId::DiscUniqueBranch) => self.discovery_unique_branch(request, frame),
            Some(ParameterId::DiscMute) => self.discovery_mute(request, frame, true),
            Some(ParameterId::DiscUnMute) => self.discovery_mute(request, frame, false),
            // Discovery never NACKs.
            _ => DispatchOutcome::NoResponse,
        }
    }

    fn discovery_unique_branch(
        &mut self,
        request: &Request<'_>,
        frame: &mut FrameBuffer,
    ) -> DispatchOutcome {
        if self.root.is_muted || request.data.len() != 12 {
            return DispatchOutcome::NoResponse;
        }
        let lower = Uid::from_bytes(request.data[..6].try_into().unwrap_or([0; 6]));
        let upper = Uid::from_bytes(request.data[6..].try_into().unwrap_or([0; 6]));
        if self.uid < lower || self.uid > upper {
            return DispatchOutcome::NoResponse;
        }

        trace!("answering discovery branch {lower}..{upper}");
        let storage = frame.storage_mut();
        let mut response = [0; dub::DUB_RESPONSE_SIZE];
        dub::encode(self.uid, &mut response);
        storage[..dub::DUB_RESPONSE_SIZE].copy_from_slice(&response);
        DispatchOutcome::RawDub(dub::DUB_RESPONSE_SIZE)
    }

    fn discovery_mute(
        &mut self,
        request: &Request<'_>,
        frame: &mut FrameBuffer,
        mute: bool,
    ) -> DispatchOutcome {
        // Malformed discovery requests are dropped, never NACKed.
        if !request.data.is_empty() {
            return DispatchOutcome::NoResponse;
        }

        debug!("{}", if mute { "muted" } else { "unmuted" });
        self.root.is_muted = mute;
        for sub in &mut self.subs {
            sub.is_muted = mute;
        }

        if !request.is_unicast {
            return DispatchOutcome::NoResponse;
        }

        let mut control = ControlField::empty();
        if !self.subs.is_empty() {
            control |= ControlField::SUB_DEVICES_PRESENT;
        }
        if self.root.def().is_managed_proxy {
            control |= ControlField::MANAGED_PROXY;
        }
        if self.root.def().is_proxied_device {
            control |= ControlField::PROXIED_DEVICE;
        }

        let storage = frame.storage_mut();
        storage[RdmHeader::SIZE..RdmHeader::SIZE + 2].copy_from_slice(&control.bits().to_be_bytes());
        build_reply(
            frame,
            &request.header,
            self.uid,
            self.root.queued_message_count(),
            ResponseType::Ack,
            2,
            None,
        )
    }

    fn dispatch_get(
        &mut self,
        request: &Request<'_>,
        frame: &mut FrameBuffer,
        counters: &mut ReceiverCounters,
    ) -> DispatchOutcome {
        // A GET needs somewhere to send the answer.
        if !request.is_unicast {
            return DispatchOutcome::NoResponse;
        }

        let sub_count = self.sub_device_count();
        let target = match self.target(request.header.sub_device()) {
            // GET cannot address all sub-devices at once.
            Ok(Target::AllSubs) | Err(_) => {
                return nack_reply(
                    frame,
                    request,
                    self.uid,
                    self.root.queued_message_count(),
                    NackReason::SubDeviceOutOfRange,
                );
            }
            Ok(Target::Root) => &mut self.root,
            Ok(Target::Sub(index)) => &mut self.subs[index],
        };

        // The reply reports the queue depth of whoever answers.
        let msg_count = target.queued_message_count();
        let (outcome, param_len, reply_pid) =
            run_get(target, request, frame, counters, sub_count);
        finish_reply(
            frame,
            request,
            self.uid,
            msg_count,
            outcome,
            param_len,
            reply_pid,
        )
    }

    fn dispatch_set(
        &mut self,
        request: &Request<'_>,
        frame: &mut FrameBuffer,
        counters: &mut ReceiverCounters,
    ) -> DispatchOutcome {
        let sub_count = self.sub_device_count();

        // The reply reports the queue depth of whoever executed the SET,
        // read after the handler ran so the count is current.
        let (outcome, param_len, reply_pid, msg_count) =
            match self.target(request.header.sub_device()) {
                Err(reason) => (
                    Outcome::Nack(reason),
                    0,
                    None,
                    self.root.queued_message_count(),
                ),
                Ok(Target::Root) => {
                    let (outcome, param_len, reply_pid) =
                        run_set(&mut self.root, request, frame, counters, sub_count);
                    (
                        outcome,
                        param_len,
                        reply_pid,
                        self.root.queued_message_count(),
                    )
                }
                Ok(Target::Sub(index)) => {
                    let (outcome, param_len, reply_pid) =
                        run_set(&mut self.subs[index], request, frame, counters, sub_count);
                    (
                        outcome,
                        param_len,
                        reply_pid,
                        self.subs[index].queued_message_count(),
                    )
                }
                Ok(Target::AllSubs) => {
                    // Each sub-device executes; the single acknowledgement
                    // carries no parameter data. With no single addressed
                    // responder, the count comes from the root.
                    let mut scratch = [0; MAX_PARAM_DATA_LENGTH];
                    let mut combined = Outcome::Ack;
                    for sub in &mut self.subs {
                        let (outcome, _, _) =
                            run_set_into(sub, request, &mut scratch, counters, sub_count);
                        if matches!(combined, Outcome::Ack) {
                            if let Outcome::Nack(reason) = outcome {
                                combined = Outcome::Nack(reason);
                            }
                        }
                    }
                    (combined, 0, None, self.root.queued_message_count())
                }
            };

        // Broadcast SETs execute but nothing answers.
        if !request.is_unicast {
            return DispatchOutcome::NoResponse;
        }
        finish_reply(
            frame,
            request,
            self.uid,
            msg_count,
            outcome,
            param_len,
            reply_pid,
        )
    }
}

impl RdmHandler for ResponderSet<'_> {
    fn dispatch(
        &mut self,
        frame: &mut FrameBuffer,
        counters: &mut ReceiverCounters,
    ) -> DispatchOutcome {
        let header = *DataView::from(frame.as_slice()).get::<RdmHeader>(0);
        let Some(class) = header.command_class() else {
            return DispatchOutcome::NoResponse;
        };
        if !class.is_request() {
            // Someone else's response traffic.
            return DispatchOutcome::NoResponse;
        }
        if !header.dest_uid().addresses(self.uid) {
            return DispatchOutcome::NoResponse;
        }

        let pdl = usize::from(header.param_data_length);
        let mut param_copy = [0; MAX_PARAM_DATA_LENGTH];
        param_copy[..pdl].copy_from_slice(&frame.as_slice()[RdmHeader::SIZE..RdmHeader::SIZE + pdl]);
        let request = Request {
            header,
            data: &param_copy[..pdl],
            is_unicast: header.dest_uid().is_unicast(),
        };

        let sub = header.sub_device();
        if !sub.is_root()
            && header
                .parameter_id()
                .is_some_and(ParameterId::is_root_only)
        {
            debug!("dropping root-only parameter addressed to sub-device {sub}");
            return DispatchOutcome::NoResponse;
        }

        match class {
            CommandClass::DiscoveryCommand => self.dispatch_discovery(&request, frame),
            CommandClass::GetCommand => self.dispatch_get(&request, frame, counters),
            CommandClass::SetCommand => self.dispatch_set(&request, frame, counters),
            _ => DispatchOutcome::NoResponse,
        }
    }
}

/// Runs a GET handler against `responder`, writing reply parameter data
/// into the frame buffer's parameter section.
fn run_get<'d>(
    responder: &mut Responder<'d>,
    request: &Request<'_>,
    frame: &mut FrameBuffer,
    counters: &mut ReceiverCounters,
    sub_device_count: u16,
) -> (Outcome, usize, Option<ParameterId>) {
    let Some(descriptor) = handlers::lookup(request.header.param_id()) else {
        return (Outcome::Nack(NackReason::UnknownPid), 0, None);
    };
    let Some(get) = descriptor.get else {
        return (Outcome::Nack(NackReason::UnsupportedCommandClass), 0, None);
    };
    if request.data.len() != usize::from(descriptor.get_param_size) {
        return (Outcome::Nack(NackReason::FormatError), 0, None);
    }

    let storage = frame.storage_mut();
    let param_section = &mut storage[RdmHeader::SIZE..RdmHeader::SIZE + MAX_PARAM_DATA_LENGTH];
    let mut ctx = Context {
        responder,
        request,
        writer: MessageWriter::new(param_section),
        counters,
        sub_device_count,
        reply_param_id: None,
    };
    let outcome = get(&mut ctx);
    let param_len = ctx.writer.len();
    let reply_pid = ctx.reply_param_id;
    (outcome, param_len, reply_pid)
}

/// Runs a SET handler against `responder`; SET handlers validate their own
/// parameter length and ranges.
fn run_set<'d>(
    responder: &mut Responder<'d>,
    request: &Request<'_>,
    frame: &mut FrameBuffer,
    counters: &mut ReceiverCounters,
    sub_device_count: u16,
) -> (Outcome, usize, Option<ParameterId>) {
    let storage = frame.storage_mut();
    let param_section = &mut storage[RdmHeader::SIZE..RdmHeader::SIZE + MAX_PARAM_DATA_LENGTH];
    run_set_into(responder, request, param_section, counters, sub_device_count)
}

fn run_set_into<'d>(
    responder: &mut Responder<'d>,
    request: &Request<'_>,
    param_section: &mut [u8],
    counters: &mut ReceiverCounters,
    sub_device_count: u16,
) -> (Outcome, usize, Option<ParameterId>) {
    let Some(descriptor) = handlers::lookup(request.header.param_id()) else {
        return (Outcome::Nack(NackReason::UnknownPid), 0, None);
    };
    let Some(set) = descriptor.set else {
        return (Outcome::Nack(NackReason::UnsupportedCommandClass), 0, None);
    };

    let mut ctx = Context {
        responder,
        request,
        writer: MessageWriter::new(param_section),
        counters,
        sub_device_count,
        reply_param_id: None,
    };
    let outcome = set(&mut ctx);
    let param_len = ctx.writer.len();
    let reply_pid = ctx.reply_param_id;
    (outcome, param_len, reply_pid)
}

/// Turns a handler outcome into a framed reply (or silence).
fn finish_reply(
    frame: &mut FrameBuffer,
    request: &Request<'_>,
    uid: Uid,
    message_count: u8,
    outcome: Outcome,
    param_len: usize,
    reply_pid: Option<ParameterId>,
) -> DispatchOutcome {
    match outcome {
        Outcome::NoResponse => DispatchOutcome::NoResponse,
        Outcome::Ack => build_reply(
            frame,
            &request.header,
            uid,
            message_count,
            ResponseType::Ack,
            param_len,
            reply_pid,
        ),
        Outcome::Nack(reason) => nack_reply(frame, request, uid, message_count, reason),
    }
}

fn nack_reply(
    frame: &mut FrameBuffer,
    request: &Request<'_>,
    uid: Uid,
    message_count: u8,
    reason: NackReason,
) -> DispatchOutcome {
    debug!("NACK {}: {reason}", request.header.param_id());
    let storage = frame.storage_mut();
    storage[RdmHeader::SIZE..RdmHeader::SIZE + 2]
        .copy_from_slice(&(reason as u16).to_be_bytes());
    build_reply(
        frame,
        &request.header,
        uid,
        message_count,
        ResponseType::NackReason,
        2,
        None,
    )
}

/// Assembles the reply header around parameter data already sitting in the
/// buffer's parameter section, then appends the checksum.
fn build_reply(
    frame: &mut FrameBuffer,
    request: &RdmHeader,
    uid: Uid,
    message_count: u8,
    response_type: ResponseType,
    param_len: usize,
    reply_pid: Option<ParameterId>,
) -> DispatchOutcome {
    let mut header = request.reply_template(uid, message_count);
    header.set_response_type(response_type);
    if let Some(pid) = reply_pid {
        header.set_param_id(pid as u16);
    }
    header.param_data_length = u8::try_from(param_len).unwrap_or(0);
    header.message_length = u8::try_from(RdmHeader::SIZE + param_len).unwrap_or(0);

    let storage = frame.storage_mut();
    storage[..RdmHeader::SIZE].copy_from_slice(header.as_bytes());
    let total = codec::append_checksum(storage, RdmHeader::SIZE + param_len);
    DispatchOutcome::Reply(total)
}
