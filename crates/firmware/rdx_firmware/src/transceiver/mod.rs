//! The line-level transceiver engine.
//!
//! One engine instance drives the RS-485 bus in exactly one of two roles:
//!
//! * **Controller** — transmits host-queued frames (break, mark, slots) and
//!   solicits RDM responses or raw discovery windows.
//! * **Responder** — waits for breaks, captures frames, and transmits the
//!   replies the RDM dispatch stage stages in the shared buffer.
//!
//! The board's interrupt glue feeds the engine through the `on_*` entry
//! points (timer expiry, input-capture edges, UART bytes, transmit-complete);
//! each makes one state transition and returns. The foreground loop calls
//! [`Transceiver::tasks`] to start queued transmissions, run RDM dispatch
//! and deliver completion events. Queued operations are strictly FIFO and an
//! operation in flight is never preempted.

mod controller;
mod line;
mod timing;

use arrayvec::ArrayVec;
use log::{debug, warn};
use rdx_protocol::{MAX_DMX_FRAME_SIZE, MAX_DMX_SLOTS, MAX_RDM_FRAME_SIZE, MIN_RDM_FRAME_SIZE, SC_DMX512};
use strum::Display;

pub use self::timing::{
    CTRL_BREAK_TO_BREAK_MIN_US, CTRL_BROADCAST_BACKOFF_US, CTRL_DUB_BACKOFF_US,
    CTRL_MISSING_RESPONSE_BACKOFF_US, CTRL_NON_RDM_BACKOFF_US, CTRL_RX_BREAK_MAX_US,
    CTRL_RX_BREAK_MIN_US, CTRL_RX_MARK_MAX_US, MAX_TX_BREAK_US, MAX_TX_MARK_US, MIN_TX_BREAK_US,
    MIN_TX_MARK_US, RESP_DMX_INTERSLOT_TIMEOUT_US, RESP_RDM_INTERSLOT_TIMEOUT_US,
    RESP_RX_BREAK_MAX_US, RESP_RX_BREAK_MIN_US, TimingError, TimingParams,
};
use crate::{
    counters::ReceiverCounters,
    event::{Event, EventSink, FrameClass, OpResult, Token},
    frame::{FrameBuffer, RdmHandler},
    hal::{BusDirection, Edge, Hal, UartStatus},
};

/// Which role the engine currently plays on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Mode {
    Controller,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub(crate) enum ControllerState {
    /// Nothing in flight; allowed to transmit immediately.
    Idle,
    /// Waiting out a backoff before the next break.
    Backoff,
    TxBreak,
    TxMark,
    TxSlots,
    /// Slots fed; waiting for the shift register to drain.
    TxDrain,
    /// Unicast RDM sent; waiting for the response break.
    AwaitResponse,
    /// Falling edge seen; measuring the response break.
    RxBreak,
    /// Rising edge seen; measuring the mark after break.
    RxMark,
    RxSlots,
    /// Discovery sent; capturing the raw response window.
    AwaitDub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub(crate) enum ResponderState {
    Idle,
    /// Falling edge seen; measuring the break.
    RxBreak,
    /// Rising edge seen; waiting for the first slot.
    RxMab,
    RxSlots,
    /// A complete frame waits for the foreground dispatch pass.
    FramePending,
    /// Reply staged; waiting out the turnaround delay.
    ReplyDelay,
    ReplyBreak,
    ReplyMark,
    ReplySlots,
    ReplyDrain,
    /// Raw discovery response staged; waiting out the turnaround delay.
    DubDelay,
    DubTx,
    DubDrain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Controller(ControllerState),
    Responder(ResponderState),
}

/// Backoff class applied when a controller operation completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Backoff {
    NonRdm,
    Broadcast,
    MissingResponse,
    PostResponse,
    /// Measured from the discovery break start, not from completion.
    Dub,
}

/// One queued host operation with its frame bytes.
pub(crate) struct OpSlot {
    pub(crate) token: Token,
    pub(crate) class: FrameClass,
    pub(crate) len: usize,
    pub(crate) data: [u8; MAX_DMX_FRAME_SIZE],
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum DataRef {
    None,
    /// The receive window, truncated to this length.
    Rx(usize),
}

pub(crate) struct PendingEvent {
    pub(crate) token: Token,
    pub(crate) kind: PendingKind,
}

pub(crate) enum PendingKind {
    Completion {
        class: FrameClass,
        result: OpResult,
        data: DataRef,
    },
    ModeChanged {
        mode: Mode,
    },
}

/// The transceiver engine.
pub struct Transceiver {
    state: State,
    params: TimingParams,
    counters: ReceiverCounters,
    active: Option<OpSlot>,
    next: Option<OpSlot>,
    rx: FrameBuffer,
    pending: ArrayVec<PendingEvent, 8>,
    tx_pos: usize,
    /// Microsecond timestamp of the most recent transmitted break start.
    break_start: u32,
    /// Timestamp of the last falling edge under measurement.
    fall_time: u32,
    /// Timestamp of the last rising edge under measurement.
    rise_time: u32,
    /// Length of a staged responder reply.
    reply_len: usize,
    frame_ready: bool,
    jitter_state: u16,
}

impl Transceiver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Controller(ControllerState::Idle),
            params: TimingParams::default(),
            counters: ReceiverCounters::new(),
            active: None,
            next: None,
            rx: FrameBuffer::new(),
            pending: ArrayVec::new(),
            tx_pos: 0,
            break_start: 0,
            fall_time: 0,
            rise_time: 0,
            reply_len: 0,
            frame_ready: false,
            jitter_state: 0x5aa5,
        }
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        match self.state {
            State::Controller(_) => Mode::Controller,
            State::Responder(_) => Mode::Responder,
        }
    }

    #[must_use]
    pub fn params(&self) -> &TimingParams {
        &self.params
    }

    #[must_use]
    pub fn counters(&self) -> &ReceiverCounters {
        &self.counters
    }

    /// The most recently captured receive window (for diagnostics and for
    /// inspecting responder-mode DMX slots).
    #[must_use]
    pub fn rx_window(&self) -> &[u8] {
        self.rx.as_slice()
    }

    /// # Errors
    ///
    /// Rejects values outside `44..=800` µs; the engine keeps its previous
    /// setting.
    pub fn set_break_time(&mut self, micros: u32) -> Result<(), TimingError> {
        self.params.set_break_us(micros)
    }

    /// # Errors
    ///
    /// Rejects values outside `4..=800` µs.
    pub fn set_mark_time(&mut self, micros: u32) -> Result<(), TimingError> {
        self.params.set_mark_us(micros)
    }

    /// # Errors
    ///
    /// Rejects values outside `10..=50` tenths of a millisecond.
    pub fn set_rdm_response_timeout(&mut self, tenths_ms: u16) -> Result<(), TimingError> {
        self.params.set_rdm_response_timeout(tenths_ms)
    }

    /// # Errors
    ///
    /// Rejects values above `50` tenths of a millisecond.
    pub fn set_rdm_broadcast_timeout(&mut self, tenths_ms: u16) -> Result<(), TimingError> {
        self.params.set_rdm_broadcast_timeout(tenths_ms)
    }

    /// # Errors
    ///
    /// Rejects values outside `10000..=35000` tenths of a microsecond.
    pub fn set_dub_response_limit(&mut self, tenths_us: u16) -> Result<(), TimingError> {
        self.params.set_dub_response_limit(tenths_us)
    }

    /// # Errors
    ///
    /// Rejects values outside `1760..=20000` tenths of a microsecond.
    pub fn set_responder_delay(&mut self, tenths_us: u16) -> Result<(), TimingError> {
        self.params.set_responder_delay(tenths_us)
    }

    /// # Errors
    ///
    /// Rejects jitter that would push delay plus jitter past 2 ms.
    pub fn set_responder_jitter(&mut self, tenths_us: u16) -> Result<(), TimingError> {
        self.params.set_responder_jitter(tenths_us)
    }

    /// Switches role. Any in-flight or queued operation completes as
    /// [`OpResult::Aborted`]; the token is echoed back once the change is
    /// reported through the sink.
    pub fn set_mode<H: Hal>(&mut self, hal: &mut H, mode: Mode, token: Token) {
        self.cancel_all(hal);
        self.state = match mode {
            Mode::Controller => State::Controller(ControllerState::Idle),
            Mode::Responder => State::Responder(ResponderState::Idle),
        };
        debug!("mode change to {mode}, token {token}");
        self.push_event(PendingEvent {
            token,
            kind: PendingKind::ModeChanged { mode },
        });
    }

    /// Aborts everything in flight, returns both state machines to idle and
    /// points the bus driver at the receiver. The recovery lever of last
    /// resort; always fully effective.
    pub fn reset<H: Hal>(&mut self, hal: &mut H) {
        let mode = self.mode();
        self.cancel_all(hal);
        self.state = match mode {
            Mode::Controller => State::Controller(ControllerState::Idle),
            Mode::Responder => State::Responder(ResponderState::Idle),
        };
        debug!("transceiver reset");
    }

    /// Queues a null-start-code DMX frame of up to 512 slots.
    pub fn queue_dmx(&mut self, token: Token, slots: &[u8]) -> bool {
        if slots.len() > MAX_DMX_SLOTS {
            return false;
        }
        self.enqueue(token, FrameClass::Dmx, Some(SC_DMX512), slots)
    }

    /// Queues an alternate-start-code frame.
    pub fn queue_asc(&mut self, token: Token, start_code: u8, data: &[u8]) -> bool {
        if data.len() > MAX_DMX_SLOTS {
            return false;
        }
        self.enqueue(token, FrameClass::Asc, Some(start_code), data)
    }

    /// Queues a discovery-unique-branch request. `frame` is the complete
    /// RDM frame including start code and checksum.
    pub fn queue_rdm_dub(&mut self, token: Token, frame: &[u8]) -> bool {
        if !(MIN_RDM_FRAME_SIZE..=MAX_RDM_FRAME_SIZE).contains(&frame.len()) {
            return false;
        }
        self.enqueue(token, FrameClass::RdmDub, None, frame)
    }

    /// Queues an RDM request. `frame` is the complete RDM frame including
    /// start code and checksum; `is_broadcast` selects whether a response
    /// window is opened afterwards.
    pub fn queue_rdm_request(&mut self, token: Token, frame: &[u8], is_broadcast: bool) -> bool {
        if !(MIN_RDM_FRAME_SIZE..=MAX_RDM_FRAME_SIZE).contains(&frame.len()) {
            return false;
        }
        let class = if is_broadcast {
            FrameClass::RdmBroadcast
        } else {
            FrameClass::RdmRequest
        };
        self.enqueue(token, class, None, frame)
    }

    /// Queues a loopback self test. Takes a FIFO slot like any operation
    /// but never reaches the bus.
    pub fn queue_self_test(&mut self, token: Token) -> bool {
        self.enqueue(token, FrameClass::SelfTest, None, &[])
    }

    /// Foreground pass: delivers pending completion events, starts queued
    /// transmissions and runs RDM dispatch on captured frames. Never
    /// blocks.
    pub fn tasks<H: Hal>(
        &mut self,
        hal: &mut H,
        handler: &mut dyn RdmHandler,
        sink: &mut dyn EventSink,
    ) {
        self.flush_events(sink);
        match self.state {
            State::Controller(ControllerState::Idle) => {
                if self.active.is_some() {
                    self.controller_begin_op(hal);
                }
            }
            State::Responder(ResponderState::FramePending) => {
                if self.frame_ready {
                    self.responder_dispatch(hal, handler);
                }
            }
            _ => {}
        }
        self.flush_events(sink);
    }

    /// One-shot timer expiry.
    pub fn on_timer<H: Hal>(&mut self, hal: &mut H) {
        match self.state {
            State::Controller(state) => self.controller_on_timer(hal, state),
            State::Responder(state) => self.responder_on_timer(hal, state),
        }
    }

    /// Input-capture edge on the bus, stamped with the free-running
    /// microsecond counter.
    pub fn on_bus_edge<H: Hal>(&mut self, hal: &mut H, edge: Edge, timestamp: u32) {
        match self.state {
            State::Controller(state) => self.controller_on_edge(hal, state, edge, timestamp),
            State::Responder(state) => self.responder_on_edge(hal, state, edge, timestamp),
        }
    }

    /// One received byte with its line status.
    pub fn on_rx_byte<H: Hal>(&mut self, hal: &mut H, byte: u8, status: UartStatus) {
        match self.state {
            State::Controller(state) => self.controller_on_rx_byte(hal, state, byte, status),
            State::Responder(state) => self.responder_on_rx_byte(hal, state, byte, status),
        }
    }

    /// Transmit FIFO has room again.
    pub fn on_tx_ready<H: Hal>(&mut self, hal: &mut H) {
        match self.state {
            State::Controller(ControllerState::TxSlots) => self.controller_feed_slots(hal),
            State::Responder(ResponderState::ReplySlots | ResponderState::DubTx) => {
                self.responder_feed_reply(hal);
            }
            _ => {}
        }
    }

    /// Transmit shift register drained; the last stop bit is on the wire.
    pub fn on_tx_complete<H: Hal>(&mut self, hal: &mut H) {
        match self.state {
            State::Controller(ControllerState::TxDrain) => self.controller_on_tx_complete(hal),
            State::Responder(ResponderState::ReplyDrain | ResponderState::DubDrain) => {
                self.responder_on_tx_complete(hal);
            }
            _ => {}
        }
    }

    fn enqueue(
        &mut self,
        token: Token,
        class: FrameClass,
        start_code: Option<u8>,
        payload: &[u8],
    ) -> bool {
        if !matches!(self.state, State::Controller(_)) {
            warn!("rejecting {class} queue in responder mode");
            return false;
        }
        if self.active.is_some() && self.next.is_some() {
            warn!("rejecting {class} queue, both slots full");
            return false;
        }

        let mut op = OpSlot {
            token,
            class,
            len: 0,
            data: [0; MAX_DMX_FRAME_SIZE],
        };
        if let Some(code) = start_code {
            op.data[0] = code;
            op.len = 1;
        }
        op.data[op.len..op.len + payload.len()].copy_from_slice(payload);
        op.len += payload.len();

        if self.active.is_none() {
            self.active = Some(op);
        } else {
            self.next = Some(op);
        }
        true
    }

    fn cancel_all<H: Hal>(&mut self, hal: &mut H) {
        hal.disarm_timer();
        hal.drive_break(false);
        hal.set_direction(BusDirection::Receive);

        for op in [self.active.take(), self.next.take()].into_iter().flatten() {
            self.push_event(PendingEvent {
                token: op.token,
                kind: PendingKind::Completion {
                    class: op.class,
                    result: OpResult::Aborted,
                    data: DataRef::None,
                },
            });
        }
        self.rx.clear();
        self.frame_ready = false;
        self.reply_len = 0;
        self.tx_pos = 0;
    }

    pub(crate) fn push_event(&mut self, event: PendingEvent) {
        if self.pending.try_push(event).is_err() {
            warn!("event queue overflow, completion dropped");
        }
    }

    fn flush_events(&mut self, sink: &mut dyn EventSink) {
        while !self.pending.is_empty() {
            let event = self.pending.remove(0);
            match event.kind {
                PendingKind::Completion {
                    class,
                    result,
                    data,
                } => {
                    let bytes: &[u8] = match data {
                        DataRef::None => &[],
                        DataRef::Rx(len) => &self.rx.as_slice()[..len.min(self.rx.len())],
                    };
                    sink.event(Event::Completion {
                        token: event.token,
                        class,
                        result,
                        data: bytes,
                    });
                }
                PendingKind::ModeChanged { mode } => {
                    sink.event(Event::ModeChanged {
                        token: event.token,
                        mode,
                    });
                }
            }
        }
    }

    /// Next turnaround delay in µs, with configured jitter applied.
    pub(crate) fn turnaround_us(&mut self) -> u32 {
        let jitter_span = self.params.responder_jitter_us();
        let mut delay = self.params.responder_delay_us();
        if jitter_span > 0 {
            self.jitter_state = self
                .jitter_state
                .wrapping_mul(25_173)
                .wrapping_add(13_849);
            delay += u32::from(self.jitter_state) % (jitter_span + 1);
        }
        delay
    }
}

impl Default for Transceiver {
    fn default() -> Self {
        Self::new()
    }
}
