//! Cumulative receive counters.
//!
//! The three RDM error counters back the COMMS_STATUS parameter; the frame
//! totals are diagnostics only. All counters saturate rather than wrap so a
//! flooded bus cannot make an error count look small again.

use rdx_protocol::FrameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiverCounters {
    dmx_frames: u16,
    rdm_frames: u16,
    rdm_short_frame: u16,
    rdm_length_mismatch: u16,
    rdm_checksum_invalid: u16,
}

impl ReceiverCounters {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dmx_frames: 0,
            rdm_frames: 0,
            rdm_short_frame: 0,
            rdm_length_mismatch: 0,
            rdm_checksum_invalid: 0,
        }
    }

    pub fn count_dmx_frame(&mut self) {
        self.dmx_frames = self.dmx_frames.saturating_add(1);
    }

    pub fn count_rdm_frame(&mut self) {
        self.rdm_frames = self.rdm_frames.saturating_add(1);
    }

    pub fn count_short_frame(&mut self) {
        self.rdm_short_frame = self.rdm_short_frame.saturating_add(1);
    }

    pub fn count_length_mismatch(&mut self) {
        self.rdm_length_mismatch = self.rdm_length_mismatch.saturating_add(1);
    }

    pub fn count_checksum_invalid(&mut self) {
        self.rdm_checksum_invalid = self.rdm_checksum_invalid.saturating_add(1);
    }

    /// Counts one frame-validation failure. [`FrameError::NotRdm`] belongs
    /// to a different protocol and counts nothing.
    pub fn count_frame_error(&mut self, error: FrameError) {
        match error {
            FrameError::ShortFrame => self.count_short_frame(),
            FrameError::LengthMismatch => self.count_length_mismatch(),
            FrameError::ChecksumInvalid => self.count_checksum_invalid(),
            FrameError::NotRdm => {}
        }
    }

    #[must_use]
    pub fn dmx_frames(&self) -> u16 {
        self.dmx_frames
    }

    #[must_use]
    pub fn rdm_frames(&self) -> u16 {
        self.rdm_frames
    }

    #[must_use]
    pub fn short_frame(&self) -> u16 {
        self.rdm_short_frame
    }

    #[must_use]
    pub fn length_mismatch(&self) -> u16 {
        self.rdm_length_mismatch
    }

    #[must_use]
    pub fn checksum_invalid(&self) -> u16 {
        self.rdm_checksum_invalid
    }

    /// Clears the three COMMS_STATUS counters; the frame totals are
    /// diagnostic and survive.
    pub fn reset_comms_status(&mut self) {
        self.rdm_short_frame = 0;
        self.rdm_length_mismatch = 0;
        self.rdm_checksum_invalid = 0;
    }
}
