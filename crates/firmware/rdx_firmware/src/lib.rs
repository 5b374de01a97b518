//! Firmware core of a USB-attached DMX512/RDM interface.
//!
//! The device sits between a USB host and an RS-485 lighting bus and acts
//! either as a DMX/RDM controller (originating frames, soliciting replies)
//! or as an RDM responder (being discovered and configured on the bus).
//!
//! The core is platform-independent: all pin, UART and timer access goes
//! through the [`hal::Hal`] capability object handed in by the board glue,
//! and all interrupt handlers are modeled as plain state-mutator methods the
//! glue calls at byte, edge and timer boundaries. The foreground loop calls
//! `tasks()` on each module in round robin; no call blocks.
//!
//! Module map:
//!
//! * [`ticks`] — monotonic 10 ms coarse timer for timeouts and LED cadence
//! * [`counters`] — cumulative receive counters for comms-status reporting
//! * [`transceiver`] — the line-level break/mark/slot state machines
//! * [`responder`] — RDM parameter dispatch and the responder device model

#![cfg_attr(not(test), no_std)]

pub mod counters;
pub mod event;
pub mod frame;
pub mod hal;
pub mod responder;
pub mod ticks;
pub mod transceiver;

pub use self::{
    counters::ReceiverCounters,
    event::{Event, EventSink, FrameClass, OpResult, Token},
    frame::{DispatchOutcome, FrameBuffer, RdmHandler},
    hal::{BusDirection, Edge, Hal, UartStatus},
    ticks::{CoarseTimer, Ticks},
    transceiver::{Mode, TimingError, TimingParams, Transceiver},
};
