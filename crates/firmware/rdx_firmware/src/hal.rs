//! The capability object through which the core reaches the board.
//!
//! The platform implements [`Hal`] once and passes it into every call that
//! may touch hardware. The core never holds the object across calls, so the
//! borrow discipline mirrors the single-owner rule for the bus: whoever is
//! inside a state-machine method owns the pins for its duration.

use bitflags::bitflags;

/// Direction of the RS-485 driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusDirection {
    Receive,
    Transmit,
}

/// Edge polarity reported by the input-capture unit watching the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Falling,
    Rising,
}

bitflags! {
    /// Receive-side line status delivered with each byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct UartStatus: u8 {
        const FRAMING_ERROR = 1 << 0;
        const PARITY_ERROR = 1 << 1;
        const OVERRUN = 1 << 2;
    }
}

impl UartStatus {
    /// Returns `true` if the byte arrived damaged.
    #[must_use]
    pub fn is_error(self) -> bool {
        !self.is_empty()
    }
}

/// Board capabilities required by the core.
///
/// `now` must come from a free-running microsecond counter; the same
/// counter timestamps the edges passed to the input-capture entry point,
/// so durations are plain wrapping subtractions.
pub trait Hal {
    /// Current value of the free-running microsecond counter.
    fn now(&self) -> u32;

    /// Points the RS-485 driver at the bus or at the receiver.
    fn set_direction(&mut self, direction: BusDirection);

    /// Drives the transmit line into a break (`true`) or releases it to the
    /// marking state (`false`).
    fn drive_break(&mut self, active: bool);

    /// Arms the one-shot timer to fire in `micros`; re-arming replaces any
    /// pending expiry.
    fn arm_timer(&mut self, micros: u32);

    /// Cancels a pending one-shot expiry.
    fn disarm_timer(&mut self);

    /// Feeds bytes into the UART transmit FIFO, returning how many were
    /// accepted.
    fn uart_write(&mut self, bytes: &[u8]) -> usize;

    /// Discards anything sitting in the UART receive FIFO.
    fn flush_rx(&mut self);

    /// Identify indicator, driven by the responder.
    fn set_identify_led(&mut self, on: bool);

    /// Mute indicator, driven by the responder.
    fn set_mute_led(&mut self, on: bool);
}
