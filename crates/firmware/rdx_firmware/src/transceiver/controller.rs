//! Controller-mode transitions: break/mark/slot generation, the response
//! window and discovery capture.

use log::{debug, trace};
use rdx_protocol::{SC_RDM, codec};

use super::{
    Backoff, ControllerState, DataRef, PendingEvent, PendingKind, State, Transceiver, timing,
};
use crate::{
    event::{FrameClass, OpResult},
    hal::{BusDirection, Edge, Hal, UartStatus},
};

impl Transceiver {
    /// Starts the active operation. Runs from the foreground (engine idle)
    /// or straight from the backoff timer expiry.
    pub(crate) fn controller_begin_op<H: Hal>(&mut self, hal: &mut H) {
        let Some(op) = self.active.as_ref() else {
            self.state = State::Controller(ControllerState::Idle);
            return;
        };

        if op.class == FrameClass::SelfTest {
            let token = op.token;
            trace!("self test token {token} passed");
            self.active = self.next.take();
            self.push_event(PendingEvent {
                token,
                kind: PendingKind::Completion {
                    class: FrameClass::SelfTest,
                    result: OpResult::Completed,
                    data: DataRef::None,
                },
            });
            self.state = State::Controller(ControllerState::Idle);
            return;
        }

        hal.set_direction(BusDirection::Transmit);
        hal.drive_break(true);
        self.break_start = hal.now();
        self.state = State::Controller(ControllerState::TxBreak);
        hal.arm_timer(self.params.break_us());
    }

    pub(crate) fn controller_on_timer<H: Hal>(&mut self, hal: &mut H, state: ControllerState) {
        match state {
            ControllerState::Backoff => {
                if self.active.is_some() {
                    self.controller_begin_op(hal);
                } else {
                    self.state = State::Controller(ControllerState::Idle);
                }
            }
            ControllerState::TxBreak => {
                hal.drive_break(false);
                self.state = State::Controller(ControllerState::TxMark);
                hal.arm_timer(self.params.mark_us());
            }
            ControllerState::TxMark => {
                self.state = State::Controller(ControllerState::TxSlots);
                self.tx_pos = 0;
                self.controller_feed_slots(hal);
            }
            ControllerState::AwaitResponse => {
                debug!("response window closed with no break");
                self.finish_op(hal, OpResult::ReceiveTimeout, DataRef::None, Backoff::MissingResponse);
            }
            // The response deadline armed in AwaitResponse keeps running
            // while the break and mark are measured.
            ControllerState::RxBreak | ControllerState::RxMark => {
                self.finish_op(hal, OpResult::InvalidResponse, DataRef::None, Backoff::MissingResponse);
            }
            ControllerState::RxSlots => self.controller_finish_response(hal),
            ControllerState::AwaitDub => self.controller_finish_dub(hal),
            ControllerState::Idle
            | ControllerState::TxSlots
            | ControllerState::TxDrain => {}
        }
    }

    pub(crate) fn controller_on_edge<H: Hal>(
        &mut self,
        hal: &mut H,
        state: ControllerState,
        edge: Edge,
        timestamp: u32,
    ) {
        match (state, edge) {
            (ControllerState::AwaitResponse, Edge::Falling) => {
                self.fall_time = timestamp;
                self.state = State::Controller(ControllerState::RxBreak);
            }
            (ControllerState::RxBreak, Edge::Rising) => {
                let duration = timestamp.wrapping_sub(self.fall_time);
                if duration < timing::CTRL_RX_BREAK_MIN_US {
                    self.counters.count_short_frame();
                    self.finish_op(hal, OpResult::InvalidResponse, DataRef::None, Backoff::PostResponse);
                } else if duration > timing::CTRL_RX_BREAK_MAX_US {
                    self.counters.count_length_mismatch();
                    self.finish_op(hal, OpResult::InvalidResponse, DataRef::None, Backoff::PostResponse);
                } else {
                    self.rise_time = timestamp;
                    self.state = State::Controller(ControllerState::RxMark);
                }
            }
            (ControllerState::RxMark, Edge::Falling) => {
                let mark = timestamp.wrapping_sub(self.rise_time);
                if mark > timing::CTRL_RX_MARK_MAX_US {
                    self.counters.count_length_mismatch();
                    self.finish_op(hal, OpResult::InvalidResponse, DataRef::None, Backoff::PostResponse);
                } else {
                    self.rx.clear();
                    self.state = State::Controller(ControllerState::RxSlots);
                    hal.arm_timer(timing::RESP_RDM_INTERSLOT_TIMEOUT_US);
                }
            }
            // A break edge in any transmit state is noise from our own
            // line driver; later-queued work never preempts.
            _ => {}
        }
    }

    pub(crate) fn controller_on_rx_byte<H: Hal>(
        &mut self,
        hal: &mut H,
        state: ControllerState,
        byte: u8,
        status: UartStatus,
    ) {
        match state {
            // A platform that only captures break edges delivers the first
            // slot while the mark is still being measured.
            ControllerState::RxMark => {
                if status.is_error() {
                    self.counters.count_short_frame();
                    self.finish_op(hal, OpResult::InvalidResponse, DataRef::None, Backoff::PostResponse);
                    return;
                }
                self.rx.clear();
                self.rx.push(byte);
                self.state = State::Controller(ControllerState::RxSlots);
                hal.arm_timer(timing::RESP_RDM_INTERSLOT_TIMEOUT_US);
            }
            ControllerState::RxSlots => {
                if status.is_error() {
                    self.counters.count_short_frame();
                    self.finish_op(hal, OpResult::InvalidResponse, DataRef::None, Backoff::PostResponse);
                    return;
                }
                if !self.rx.push(byte) {
                    self.controller_finish_response(hal);
                    return;
                }
                hal.arm_timer(timing::RESP_RDM_INTERSLOT_TIMEOUT_US);
                if self.rdm_window_complete() || self.rx.len() == rdx_protocol::MAX_RDM_FRAME_SIZE
                {
                    self.controller_finish_response(hal);
                }
            }
            // Discovery responses collide by design; damaged bytes are part
            // of the captured window.
            ControllerState::AwaitDub => {
                self.rx.push(byte);
            }
            _ => {}
        }
    }

    pub(crate) fn controller_feed_slots<H: Hal>(&mut self, hal: &mut H) {
        let Some(op) = self.active.as_ref() else {
            return;
        };
        let written = hal.uart_write(&op.data[self.tx_pos..op.len]);
        self.tx_pos += written;
        if self.tx_pos == op.len {
            self.state = State::Controller(ControllerState::TxDrain);
        }
    }

    pub(crate) fn controller_on_tx_complete<H: Hal>(&mut self, hal: &mut H) {
        hal.set_direction(BusDirection::Receive);
        hal.flush_rx();

        let Some(class) = self.active.as_ref().map(|op| op.class) else {
            return;
        };
        match class {
            FrameClass::Dmx | FrameClass::Asc => {
                self.finish_op(hal, OpResult::Completed, DataRef::None, Backoff::NonRdm);
            }
            FrameClass::RdmBroadcast => {
                self.finish_op(hal, OpResult::Completed, DataRef::None, Backoff::Broadcast);
            }
            FrameClass::RdmRequest => {
                self.state = State::Controller(ControllerState::AwaitResponse);
                hal.arm_timer(self.params.rdm_response_timeout_us());
            }
            FrameClass::RdmDub => {
                self.rx.clear();
                self.state = State::Controller(ControllerState::AwaitDub);
                hal.arm_timer(self.params.dub_response_limit_us());
            }
            FrameClass::SelfTest => {}
        }
    }

    /// True once the window holds a complete RDM frame per its declared
    /// message length.
    fn rdm_window_complete(&self) -> bool {
        let window = self.rx.as_slice();
        if window.len() < 3 || window[0] != SC_RDM {
            return false;
        }
        window.len() == usize::from(window[2]) + 2
    }

    fn controller_finish_response<H: Hal>(&mut self, hal: &mut H) {
        let result = match codec::validate(self.rx.as_slice()) {
            Ok(_) => {
                self.counters.count_rdm_frame();
                OpResult::FrameReceived
            }
            Err(error) => {
                debug!("response rejected: {error}");
                self.counters.count_frame_error(error);
                OpResult::InvalidResponse
            }
        };
        self.finish_op(hal, result, DataRef::Rx(self.rx.len()), Backoff::PostResponse);
    }

    fn controller_finish_dub<H: Hal>(&mut self, hal: &mut H) {
        if self.rx.is_empty() {
            self.finish_op(hal, OpResult::ReceiveTimeout, DataRef::None, Backoff::Dub);
        } else {
            trace!("captured {} byte discovery window", self.rx.len());
            self.finish_op(
                hal,
                OpResult::FrameReceived,
                DataRef::Rx(self.rx.len()),
                Backoff::Dub,
            );
        }
    }

    /// Completes the active operation, promotes the queued one and arms the
    /// backoff before the next break.
    fn finish_op<H: Hal>(
        &mut self,
        hal: &mut H,
        result: OpResult,
        data: DataRef,
        backoff: Backoff,
    ) {
        let Some(op) = self.active.take() else {
            return;
        };
        self.push_event(PendingEvent {
            token: op.token,
            kind: PendingKind::Completion {
                class: op.class,
                result,
                data,
            },
        });
        self.active = self.next.take();

        let now = hal.now();
        let since_break = now.wrapping_sub(self.break_start);
        let to_break_gap = timing::CTRL_BREAK_TO_BREAK_MIN_US.saturating_sub(since_break);
        let wait = match backoff {
            Backoff::NonRdm => to_break_gap.max(timing::CTRL_NON_RDM_BACKOFF_US),
            Backoff::Broadcast => to_break_gap.max(self.params.rdm_broadcast_timeout_us()),
            Backoff::MissingResponse => {
                to_break_gap.max(timing::CTRL_MISSING_RESPONSE_BACKOFF_US)
            }
            Backoff::PostResponse => to_break_gap.max(timing::CTRL_NON_RDM_BACKOFF_US),
            Backoff::Dub => to_break_gap.max(timing::CTRL_DUB_BACKOFF_US.saturating_sub(since_break)),
        };
        self.state = State::Controller(ControllerState::Backoff);
        hal.arm_timer(wait.max(1));
    }
}
