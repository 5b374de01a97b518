//! Discovery-unique-branch (DUB) response framing.
//!
//! A DUB response is the only RDM transmission without a break: a preamble
//! of up to seven `0xfe` bytes, a `0xaa` delimiter, the responder's UID with
//! every byte doubled into an `(b | 0xaa)(b | 0x55)` pair, and a 16-bit
//! additive checksum over the twelve encoded UID bytes, expanded the same
//! way. The bit-doubling guarantees that colliding responses from multiple
//! responders corrupt the checksum instead of forging a valid UID.

use core::num::Wrapping;

use rdx_types::Uid;

/// Number of preamble bytes this implementation transmits.
pub const PREAMBLE_LEN: usize = 7;
/// Preamble byte value.
pub const PREAMBLE: u8 = 0xfe;
/// Preamble separator byte value.
pub const DELIMITER: u8 = 0xaa;
/// Total size of an encoded DUB response.
pub const DUB_RESPONSE_SIZE: usize = PREAMBLE_LEN + 1 + 12 + 4;

/// Why a captured byte window does not decode as a DUB response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DubDecodeError {
    /// Not enough bytes after the delimiter.
    #[error("truncated discovery response")]
    Truncated,
    /// No delimiter within the leading preamble bytes.
    #[error("preamble delimiter not found")]
    MissingDelimiter,
    /// Checksum mismatch, usually a collision of several responders.
    #[error("discovery response checksum mismatch")]
    ChecksumMismatch,
}

fn expand(byte: u8, out: &mut [u8]) {
    out[0] = byte | 0xaa;
    out[1] = byte | 0x55;
}

/// Encodes the DUB response for `uid` into `out`.
pub fn encode(uid: Uid, out: &mut [u8; DUB_RESPONSE_SIZE]) {
    out[..PREAMBLE_LEN].fill(PREAMBLE);
    out[PREAMBLE_LEN] = DELIMITER;

    let euid = &mut out[PREAMBLE_LEN + 1..PREAMBLE_LEN + 1 + 12];
    for (pair, byte) in euid.chunks_exact_mut(2).zip(uid.as_bytes()) {
        expand(*byte, pair);
    }
    let sum = checksum_of_encoded(&out[PREAMBLE_LEN + 1..PREAMBLE_LEN + 1 + 12]);

    let ecs = &mut out[PREAMBLE_LEN + 1 + 12..];
    expand(sum.to_be_bytes()[0], &mut ecs[0..2]);
    expand(sum.to_be_bytes()[1], &mut ecs[2..4]);
}

/// Decodes a captured DUB window back into the responding UID.
///
/// Responders may send zero to seven preamble bytes, so the delimiter is
/// searched for rather than assumed at a fixed offset.
///
/// # Errors
///
/// See [`DubDecodeError`]; a checksum mismatch usually means several
/// responders answered at once.
pub fn decode(window: &[u8]) -> Result<Uid, DubDecodeError> {
    let start = window
        .iter()
        .take(PREAMBLE_LEN + 1)
        .position(|b| *b == DELIMITER)
        .ok_or(DubDecodeError::MissingDelimiter)?;
    let body = &window[start + 1..];
    if body.len() < 16 {
        return Err(DubDecodeError::Truncated);
    }

    let mut uid = [0; 6];
    for (byte, pair) in uid.iter_mut().zip(body[..12].chunks_exact(2)) {
        *byte = pair[0] & pair[1];
    }

    let declared = u16::from_be_bytes([body[12] & body[13], body[14] & body[15]]);
    if checksum_of_encoded(&body[..12]) != declared {
        return Err(DubDecodeError::ChecksumMismatch);
    }

    Ok(Uid::from_bytes(uid))
}

fn checksum_of_encoded(euid: &[u8]) -> u16 {
    euid.iter()
        .map(|b| Wrapping(u16::from(*b)))
        .sum::<Wrapping<u16>>()
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let uid = Uid::new(0x7a70, 0x1234_5678);
        let mut out = [0; DUB_RESPONSE_SIZE];
        encode(uid, &mut out);

        assert_eq!(&out[..7], &[PREAMBLE; 7]);
        assert_eq!(out[7], DELIMITER);
        assert_eq!(decode(&out).unwrap(), uid);
    }

    #[test]
    fn encoded_bytes_carry_both_masks() {
        let uid = Uid::new(0x7a70, 0x0000_0001);
        let mut out = [0; DUB_RESPONSE_SIZE];
        encode(uid, &mut out);

        // 0x7a expands to (0x7a | 0xaa, 0x7a | 0x55).
        assert_eq!(out[8], 0xfa);
        assert_eq!(out[9], 0x7f);
    }

    #[test]
    fn short_preamble_accepted() {
        let uid = Uid::new(0x7a70, 0x0000_0002);
        let mut out = [0; DUB_RESPONSE_SIZE];
        encode(uid, &mut out);
        // A responder is allowed to send fewer preamble bytes.
        assert_eq!(decode(&out[5..]).unwrap(), uid);
    }

    #[test]
    fn collision_breaks_checksum() {
        let a = Uid::new(0x7a70, 0x0000_0001);
        let b = Uid::new(0x7a70, 0x0000_0100);
        let mut wire_a = [0; DUB_RESPONSE_SIZE];
        let mut wire_b = [0; DUB_RESPONSE_SIZE];
        encode(a, &mut wire_a);
        encode(b, &mut wire_b);

        // Wired-or of two simultaneous responses.
        let mut collided = [0; DUB_RESPONSE_SIZE];
        for (c, (x, y)) in collided.iter_mut().zip(wire_a.iter().zip(&wire_b)) {
            *c = x | y;
        }
        assert_eq!(decode(&collided), Err(DubDecodeError::ChecksumMismatch));
    }

    #[test]
    fn missing_delimiter_rejected() {
        assert_eq!(
            decode(&[PREAMBLE; DUB_RESPONSE_SIZE]),
            Err(DubDecodeError::MissingDelimiter)
        );
    }

    #[test]
    fn truncated_window_rejected() {
        let uid = Uid::new(0x7a70, 3);
        let mut out = [0; DUB_RESPONSE_SIZE];
        encode(uid, &mut out);
        assert_eq!(decode(&out[..20]), Err(DubDecodeError::Truncated));
    }
}
