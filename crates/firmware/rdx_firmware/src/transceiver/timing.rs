//! Line timing constants and tunable parameters.
//!
//! The constants are normative E1.11/E1.20 figures; the parameters are the
//! host-tunable subset, validated on every set so the engine can trust them
//! unconditionally.

/// Shortest transmit break the host may configure, µs.
pub const MIN_TX_BREAK_US: u32 = 44;
/// Longest transmit break the host may configure, µs.
pub const MAX_TX_BREAK_US: u32 = 800;
/// Shortest transmit mark-after-break, µs.
pub const MIN_TX_MARK_US: u32 = 4;
/// Longest transmit mark-after-break, µs.
pub const MAX_TX_MARK_US: u32 = 800;

/// Controller rejects response breaks shorter than this, µs.
pub const CTRL_RX_BREAK_MIN_US: u32 = 88;
/// Controller rejects response breaks longer than this, µs.
pub const CTRL_RX_BREAK_MAX_US: u32 = 352;
/// Controller rejects response marks longer than this, µs.
pub const CTRL_RX_MARK_MAX_US: u32 = 88;

/// Minimum time between two transmitted break starts, µs.
pub const CTRL_BREAK_TO_BREAK_MIN_US: u32 = 1_300;
/// Quiet time after a discovery request, measured from its break start, µs.
pub const CTRL_DUB_BACKOFF_US: u32 = 5_800;
/// Quiet time after a broadcast, µs.
pub const CTRL_BROADCAST_BACKOFF_US: u32 = 200;
/// Quiet time after an expected response failed to appear, µs.
pub const CTRL_MISSING_RESPONSE_BACKOFF_US: u32 = 3_000;
/// Quiet time after a non-RDM transmission, µs.
pub const CTRL_NON_RDM_BACKOFF_US: u32 = 200;

/// Responder rejects breaks shorter than this, µs.
pub const RESP_RX_BREAK_MIN_US: u32 = 88;
/// Responder rejects breaks longer than this, µs (1 s: the line is simply
/// dead).
pub const RESP_RX_BREAK_MAX_US: u32 = 1_000_000;

/// Responder turnaround floor, tenths of µs (176.0 µs).
pub const RESP_DELAY_MIN: u16 = 1_760;
/// Responder turnaround ceiling, tenths of µs (2.0 ms).
pub const RESP_DELAY_MAX: u16 = 20_000;

/// Abort an RDM receive when no slot arrives for this long, µs.
pub const RESP_RDM_INTERSLOT_TIMEOUT_US: u32 = 2_100;
/// Abort a DMX receive when no slot arrives for this long, µs.
pub const RESP_DMX_INTERSLOT_TIMEOUT_US: u32 = 1_000_000;

/// Response-timeout bounds, tenths of ms.
pub const RDM_RESPONSE_TIMEOUT_MIN: u16 = 10;
pub const RDM_RESPONSE_TIMEOUT_MAX: u16 = 50;
/// Broadcast-listen bounds, tenths of ms.
pub const RDM_BROADCAST_TIMEOUT_MAX: u16 = 50;
/// Discovery response window bounds, tenths of µs.
pub const DUB_RESPONSE_LIMIT_MIN: u16 = 10_000;
pub const DUB_RESPONSE_LIMIT_MAX: u16 = 35_000;

/// A rejected timing parameter. The engine state is untouched on rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimingError {
    #[error("break time {0} µs outside {MIN_TX_BREAK_US}..={MAX_TX_BREAK_US}")]
    BreakTime(u32),
    #[error("mark time {0} µs outside {MIN_TX_MARK_US}..={MAX_TX_MARK_US}")]
    MarkTime(u32),
    #[error(
        "RDM response timeout {0} outside {RDM_RESPONSE_TIMEOUT_MIN}..={RDM_RESPONSE_TIMEOUT_MAX}"
    )]
    RdmResponseTimeout(u16),
    #[error("RDM broadcast timeout {0} above {RDM_BROADCAST_TIMEOUT_MAX}")]
    RdmBroadcastTimeout(u16),
    #[error("DUB response limit {0} outside {DUB_RESPONSE_LIMIT_MIN}..={DUB_RESPONSE_LIMIT_MAX}")]
    DubResponseLimit(u16),
    #[error("responder delay {0} outside {RESP_DELAY_MIN}..={RESP_DELAY_MAX}")]
    ResponderDelay(u16),
    #[error("responder jitter {0} exceeds the delay headroom")]
    ResponderJitter(u16),
}

/// Host-tunable line timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingParams {
    break_us: u32,
    mark_us: u32,
    /// Tenths of a millisecond.
    rdm_response_timeout: u16,
    /// Tenths of a millisecond.
    rdm_broadcast_timeout: u16,
    /// Tenths of a microsecond.
    dub_response_limit: u16,
    /// Tenths of a microsecond.
    responder_delay: u16,
    /// Tenths of a microsecond.
    responder_jitter: u16,
}

impl Default for TimingParams {
    fn default() -> Self {
        Self {
            break_us: 176,
            mark_us: 12,
            rdm_response_timeout: 28,
            rdm_broadcast_timeout: 2,
            dub_response_limit: 29_000,
            responder_delay: RESP_DELAY_MIN,
            responder_jitter: 0,
        }
    }
}

impl TimingParams {
    /// Configured break duration, µs.
    #[must_use]
    pub fn break_us(&self) -> u32 {
        self.break_us
    }

    /// Configured mark duration, µs.
    #[must_use]
    pub fn mark_us(&self) -> u32 {
        self.mark_us
    }

    /// Raw response timeout, tenths of ms.
    #[must_use]
    pub fn rdm_response_timeout(&self) -> u16 {
        self.rdm_response_timeout
    }

    /// Raw broadcast listen time, tenths of ms.
    #[must_use]
    pub fn rdm_broadcast_timeout(&self) -> u16 {
        self.rdm_broadcast_timeout
    }

    /// Raw discovery window, tenths of µs.
    #[must_use]
    pub fn dub_response_limit(&self) -> u16 {
        self.dub_response_limit
    }

    /// Raw responder turnaround, tenths of µs.
    #[must_use]
    pub fn responder_delay(&self) -> u16 {
        self.responder_delay
    }

    /// Raw responder jitter, tenths of µs.
    #[must_use]
    pub fn responder_jitter(&self) -> u16 {
        self.responder_jitter
    }

    #[must_use]
    pub fn rdm_response_timeout_us(&self) -> u32 {
        u32::from(self.rdm_response_timeout) * 100
    }

    #[must_use]
    pub fn rdm_broadcast_timeout_us(&self) -> u32 {
        u32::from(self.rdm_broadcast_timeout) * 100
    }

    #[must_use]
    pub fn dub_response_limit_us(&self) -> u32 {
        u32::from(self.dub_response_limit) / 10
    }

    #[must_use]
    pub fn responder_delay_us(&self) -> u32 {
        u32::from(self.responder_delay) / 10
    }

    #[must_use]
    pub fn responder_jitter_us(&self) -> u32 {
        u32::from(self.responder_jitter) / 10
    }

    /// # Errors
    ///
    /// Rejects values outside `44..=800` µs.
    pub fn set_break_us(&mut self, micros: u32) -> Result<(), TimingError> {
        if !(MIN_TX_BREAK_US..=MAX_TX_BREAK_US).contains(&micros) {
            return Err(TimingError::BreakTime(micros));
        }
        self.break_us = micros;
        Ok(())
    }

    /// # Errors
    ///
    /// Rejects values outside `4..=800` µs.
    pub fn set_mark_us(&mut self, micros: u32) -> Result<(), TimingError> {
        if !(MIN_TX_MARK_US..=MAX_TX_MARK_US).contains(&micros) {
            return Err(TimingError::MarkTime(micros));
        }
        self.mark_us = micros;
        Ok(())
    }

    /// # Errors
    ///
    /// Rejects values outside `10..=50` tenths of a millisecond.
    pub fn set_rdm_response_timeout(&mut self, tenths_ms: u16) -> Result<(), TimingError> {
        if !(RDM_RESPONSE_TIMEOUT_MIN..=RDM_RESPONSE_TIMEOUT_MAX).contains(&tenths_ms) {
            return Err(TimingError::RdmResponseTimeout(tenths_ms));
        }
        self.rdm_response_timeout = tenths_ms;
        Ok(())
    }

    /// # Errors
    ///
    /// Rejects values above `50` tenths of a millisecond.
    pub fn set_rdm_broadcast_timeout(&mut self, tenths_ms: u16) -> Result<(), TimingError> {
        if tenths_ms > RDM_BROADCAST_TIMEOUT_MAX {
            return Err(TimingError::RdmBroadcastTimeout(tenths_ms));
        }
        self.rdm_broadcast_timeout = tenths_ms;
        Ok(())
    }

    /// # Errors
    ///
    /// Rejects values outside `10000..=35000` tenths of a microsecond.
    pub fn set_dub_response_limit(&mut self, tenths_us: u16) -> Result<(), TimingError> {
        if !(DUB_RESPONSE_LIMIT_MIN..=DUB_RESPONSE_LIMIT_MAX).contains(&tenths_us) {
            return Err(TimingError::DubResponseLimit(tenths_us));
        }
        self.dub_response_limit = tenths_us;
        Ok(())
    }

    /// # Errors
    ///
    /// Rejects values outside `1760..=20000` tenths of a microsecond, and
    /// values that would push delay plus jitter past the 2 ms ceiling.
    pub fn set_responder_delay(&mut self, tenths_us: u16) -> Result<(), TimingError> {
        if !(RESP_DELAY_MIN..=RESP_DELAY_MAX).contains(&tenths_us) {
            return Err(TimingError::ResponderDelay(tenths_us));
        }
        if tenths_us + self.responder_jitter > RESP_DELAY_MAX {
            return Err(TimingError::ResponderJitter(self.responder_jitter));
        }
        self.responder_delay = tenths_us;
        Ok(())
    }

    /// # Errors
    ///
    /// Rejects jitter that would push delay plus jitter past the 2 ms
    /// ceiling.
    pub fn set_responder_jitter(&mut self, tenths_us: u16) -> Result<(), TimingError> {
        if self.responder_delay.saturating_add(tenths_us) > RESP_DELAY_MAX {
            return Err(TimingError::ResponderJitter(tenths_us));
        }
        self.responder_jitter = tenths_us;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn break_bounds() {
        let mut params = TimingParams::default();
        assert_eq!(params.set_break_us(43), Err(TimingError::BreakTime(43)));
        assert_eq!(params.set_break_us(801), Err(TimingError::BreakTime(801)));
        assert!(params.set_break_us(44).is_ok());
        assert!(params.set_break_us(800).is_ok());
        assert_eq!(params.break_us(), 800);
    }

    #[test]
    fn mark_bounds() {
        let mut params = TimingParams::default();
        assert_eq!(params.set_mark_us(3), Err(TimingError::MarkTime(3)));
        assert_eq!(params.set_mark_us(801), Err(TimingError::MarkTime(801)));
        assert!(params.set_mark_us(4).is_ok());
        assert!(params.set_mark_us(800).is_ok());
    }

    #[test]
    fn responder_delay_bounds() {
        let mut params = TimingParams::default();
        assert_eq!(
            params.set_responder_delay(1_759),
            Err(TimingError::ResponderDelay(1_759))
        );
        assert_eq!(
            params.set_responder_delay(20_001),
            Err(TimingError::ResponderDelay(20_001))
        );
        assert!(params.set_responder_delay(1_760).is_ok());
        assert!(params.set_responder_delay(20_000).is_ok());
        assert_eq!(params.responder_delay_us(), 2_000);
    }

    #[test]
    fn jitter_respects_delay_headroom() {
        let mut params = TimingParams::default();
        params.set_responder_delay(19_000).unwrap();
        assert!(params.set_responder_jitter(1_000).is_ok());
        assert_eq!(
            params.set_responder_jitter(1_001),
            Err(TimingError::ResponderJitter(1_001))
        );

        // And the delay setter refuses to shrink past existing jitter.
        params.set_responder_jitter(1_000).unwrap();
        assert!(params.set_responder_delay(20_000).is_err());
    }

    #[test]
    fn rejection_leaves_value_unchanged() {
        let mut params = TimingParams::default();
        let before = params;
        assert!(params.set_break_us(9_999).is_err());
        assert!(params.set_dub_response_limit(9_999).is_err());
        assert_eq!(params, before);
    }
}
