//! Completion events reported to the upstream transport.

use strum::Display;

use crate::transceiver::Mode;

/// Correlation token chosen by the host for each queued operation.
pub type Token = u16;

/// What kind of frame an operation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FrameClass {
    /// Null-start-code DMX frame.
    Dmx,
    /// Alternate-start-code frame.
    Asc,
    /// Discovery unique branch request.
    RdmDub,
    /// Unicast RDM request expecting a response.
    RdmRequest,
    /// Broadcast RDM request; nothing answers.
    RdmBroadcast,
    /// Loopback self test; never reaches the bus.
    SelfTest,
}

/// How an operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum OpResult {
    /// Transmitted (or self-tested) fine; no response was expected.
    Completed,
    /// A response frame (or raw discovery window) was captured; see the
    /// event data.
    FrameReceived,
    /// The response window closed with nothing on the bus.
    ReceiveTimeout,
    /// A response arrived but was malformed or violated line timing.
    InvalidResponse,
    /// Cancelled by `reset()` or a mode change before completion.
    Aborted,
}

/// One upstream notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// A queued operation finished.
    Completion {
        token: Token,
        class: FrameClass,
        result: OpResult,
        /// Received bytes, when `result` is `FrameReceived` or
        /// `InvalidResponse`; empty otherwise. Valid only for the duration
        /// of the callback.
        data: &'a [u8],
    },
    /// A mode change finished.
    ModeChanged { token: Token, mode: Mode },
}

/// Receiver of upstream notifications; implemented by the USB transport
/// glue (and by test harnesses).
pub trait EventSink {
    fn event(&mut self, event: Event<'_>);
}

impl<F: FnMut(Event<'_>)> EventSink for F {
    fn event(&mut self, event: Event<'_>) {
        self(event);
    }
}
