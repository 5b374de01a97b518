//! Responder-mode transitions: break measurement, frame capture, dispatch
//! hand-off and reply transmission.

use log::{debug, trace};
use rdx_protocol::{SC_DMX512, SC_RDM, codec};

use super::{ResponderState, State, Transceiver, timing};
use crate::{
    frame::{DispatchOutcome, RdmHandler},
    hal::{BusDirection, Edge, Hal, UartStatus},
};

impl Transceiver {
    pub(crate) fn responder_on_edge<H: Hal>(
        &mut self,
        hal: &mut H,
        state: ResponderState,
        edge: Edge,
        timestamp: u32,
    ) {
        match (state, edge) {
            (ResponderState::Idle, Edge::Falling) => {
                self.fall_time = timestamp;
                self.state = State::Responder(ResponderState::RxBreak);
            }
            // The controller moved on before the foreground dispatched the
            // previous frame; the stale frame loses.
            (ResponderState::FramePending, Edge::Falling) => {
                debug!("new break while a frame awaited dispatch, dropping it");
                self.frame_ready = false;
                self.rx.clear();
                self.fall_time = timestamp;
                self.state = State::Responder(ResponderState::RxBreak);
            }
            (ResponderState::RxBreak, Edge::Rising) => {
                let duration = timestamp.wrapping_sub(self.fall_time);
                if duration < timing::RESP_RX_BREAK_MIN_US {
                    self.counters.count_short_frame();
                    self.state = State::Responder(ResponderState::Idle);
                } else if duration > timing::RESP_RX_BREAK_MAX_US {
                    self.counters.count_length_mismatch();
                    self.state = State::Responder(ResponderState::Idle);
                } else {
                    self.state = State::Responder(ResponderState::RxMab);
                    // Guard against a line that goes quiet after the break.
                    hal.arm_timer(timing::RESP_DMX_INTERSLOT_TIMEOUT_US);
                }
            }
            // Direction is held for the whole reply, so a break edge while
            // transmitting means something is driving against us; drop the
            // reply and listen again.
            (
                ResponderState::ReplyDelay
                | ResponderState::ReplyBreak
                | ResponderState::ReplyMark
                | ResponderState::ReplySlots
                | ResponderState::ReplyDrain
                | ResponderState::DubDelay
                | ResponderState::DubTx
                | ResponderState::DubDrain,
                Edge::Falling,
            ) => {
                debug!("break during reply transmission, abandoning reply");
                hal.disarm_timer();
                hal.drive_break(false);
                hal.set_direction(BusDirection::Receive);
                self.reply_len = 0;
                self.rx.clear();
                self.fall_time = timestamp;
                self.state = State::Responder(ResponderState::RxBreak);
            }
            _ => {}
        }
    }

    pub(crate) fn responder_on_rx_byte<H: Hal>(
        &mut self,
        hal: &mut H,
        state: ResponderState,
        byte: u8,
        status: UartStatus,
    ) {
        match state {
            ResponderState::RxMab => {
                if status.is_error() {
                    self.state = State::Responder(ResponderState::Idle);
                    hal.disarm_timer();
                    return;
                }
                self.rx.clear();
                self.rx.push(byte);
                self.state = State::Responder(ResponderState::RxSlots);
                hal.arm_timer(Self::interslot_timeout(byte));
            }
            ResponderState::RxSlots => {
                if status.is_error() {
                    self.responder_abort_rx(hal);
                    return;
                }
                if !self.rx.push(byte) {
                    self.responder_frame_done(hal);
                    return;
                }
                let start_code = self.rx.as_slice()[0];
                hal.arm_timer(Self::interslot_timeout(start_code));
                if start_code == SC_RDM {
                    if self.responder_rdm_complete() {
                        self.responder_frame_done(hal);
                    }
                } else if self.rx.len() == rdx_protocol::MAX_DMX_FRAME_SIZE {
                    self.responder_frame_done(hal);
                }
            }
            _ => {}
        }
    }

    pub(crate) fn responder_on_timer<H: Hal>(&mut self, hal: &mut H, state: ResponderState) {
        match state {
            // Break with no slots behind it.
            ResponderState::RxMab => {
                self.state = State::Responder(ResponderState::Idle);
            }
            ResponderState::RxSlots => self.responder_frame_done(hal),
            ResponderState::ReplyDelay => {
                hal.set_direction(BusDirection::Transmit);
                hal.drive_break(true);
                self.state = State::Responder(ResponderState::ReplyBreak);
                hal.arm_timer(self.params.break_us());
            }
            ResponderState::ReplyBreak => {
                hal.drive_break(false);
                self.state = State::Responder(ResponderState::ReplyMark);
                hal.arm_timer(self.params.mark_us());
            }
            ResponderState::ReplyMark => {
                self.state = State::Responder(ResponderState::ReplySlots);
                self.tx_pos = 0;
                self.responder_feed_reply(hal);
            }
            // Discovery responses carry no break and no mark.
            ResponderState::DubDelay => {
                hal.set_direction(BusDirection::Transmit);
                self.state = State::Responder(ResponderState::DubTx);
                self.tx_pos = 0;
                self.responder_feed_reply(hal);
            }
            _ => {}
        }
    }

    pub(crate) fn responder_feed_reply<H: Hal>(&mut self, hal: &mut H) {
        let reply = &self.rx.as_slice()[..self.reply_len];
        let written = hal.uart_write(&reply[self.tx_pos..]);
        self.tx_pos += written;
        if self.tx_pos == self.reply_len {
            self.state = match self.state {
                State::Responder(ResponderState::DubTx) => {
                    State::Responder(ResponderState::DubDrain)
                }
                _ => State::Responder(ResponderState::ReplyDrain),
            };
        }
    }

    pub(crate) fn responder_on_tx_complete<H: Hal>(&mut self, hal: &mut H) {
        hal.set_direction(BusDirection::Receive);
        hal.flush_rx();
        self.reply_len = 0;
        self.rx.clear();
        self.state = State::Responder(ResponderState::Idle);
    }

    /// Foreground stage: classify the captured frame, validate RDM, run
    /// dispatch, stage whatever reply comes back.
    pub(crate) fn responder_dispatch<H: Hal>(&mut self, hal: &mut H, handler: &mut dyn RdmHandler) {
        self.frame_ready = false;

        match self.rx.start_code() {
            Some(SC_DMX512) => {
                // Slots stay in the window for the platform to read out.
                self.counters.count_dmx_frame();
                self.state = State::Responder(ResponderState::Idle);
            }
            Some(SC_RDM) => {
                if let Err(error) = codec::validate(self.rx.as_slice()).map(|_| ()) {
                    debug!("dropping request: {error}");
                    self.counters.count_frame_error(error);
                    self.rx.clear();
                    self.state = State::Responder(ResponderState::Idle);
                    return;
                }
                self.counters.count_rdm_frame();
                match handler.dispatch(&mut self.rx, &mut self.counters) {
                    DispatchOutcome::NoResponse => {
                        self.rx.clear();
                        self.state = State::Responder(ResponderState::Idle);
                    }
                    DispatchOutcome::Reply(len) => {
                        trace!("staging {len} byte reply");
                        self.rx.set_len(len);
                        self.reply_len = len;
                        self.state = State::Responder(ResponderState::ReplyDelay);
                        let delay = self.turnaround_us();
                        hal.arm_timer(delay);
                    }
                    DispatchOutcome::RawDub(len) => {
                        trace!("staging {len} byte discovery response");
                        self.rx.set_len(len);
                        self.reply_len = len;
                        self.state = State::Responder(ResponderState::DubDelay);
                        let delay = self.turnaround_us();
                        hal.arm_timer(delay);
                    }
                }
            }
            // Alternate start codes are someone else's traffic.
            _ => {
                self.rx.clear();
                self.state = State::Responder(ResponderState::Idle);
            }
        }
    }

    fn responder_abort_rx<H: Hal>(&mut self, hal: &mut H) {
        hal.disarm_timer();
        if self.rx.start_code() == Some(SC_RDM) {
            self.counters.count_short_frame();
        }
        self.rx.clear();
        self.state = State::Responder(ResponderState::Idle);
    }

    fn responder_frame_done<H: Hal>(&mut self, hal: &mut H) {
        hal.disarm_timer();
        self.frame_ready = true;
        self.state = State::Responder(ResponderState::FramePending);
    }

    /// True once the window holds a complete RDM frame per its declared
    /// message length.
    fn responder_rdm_complete(&self) -> bool {
        let window = self.rx.as_slice();
        window.len() >= 3 && window.len() == usize::from(window[2]) + 2
    }

    fn interslot_timeout(start_code: u8) -> u32 {
        if start_code == SC_RDM {
            timing::RESP_RDM_INTERSLOT_TIMEOUT_US
        } else {
            timing::RESP_DMX_INTERSLOT_TIMEOUT_US
        }
    }
}
