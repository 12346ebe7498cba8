//! Frame encode / decode.
//!
//! Encoding masks key, command and payload with a per-frame random byte
//! and appends a CRC8 over everything before it.  Decoding validates in a
//! fixed order (size, CRC, marker, length, key) and returns the first
//! failure; it holds no state and can run from any context.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::crc::crc8;
use super::{FRAME_OVERHEAD, Frame, HEADER_LEN, MAX_PAYLOAD_LEN, Payload, RAND_OFFSET, STX};
use crate::error::CodecError;

/// A validated inbound frame with the obfuscation removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub cmd: u8,
    pub key: u8,
    pub payload: Payload,
}

/// Build a frame with an explicit obfuscation byte.
///
/// Payloads longer than [`MAX_PAYLOAD_LEN`] are rejected rather than
/// truncated.  An empty payload encodes to a bare 7-byte frame, which
/// [`decode`] refuses as `TooShort`; every lock command carries at least
/// one payload byte.
pub fn encode(session_key: u8, cmd: u8, payload: &[u8], rand: u8) -> Result<Frame, CodecError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLarge);
    }

    let mut frame = Frame::new();
    let [hi, lo] = STX.to_be_bytes();
    let header = [
        hi,
        lo,
        payload.len() as u8,
        rand.wrapping_add(RAND_OFFSET),
        session_key ^ rand,
        cmd ^ rand,
    ];
    // Capacity is MAX_PAYLOAD_LEN + FRAME_OVERHEAD, checked above.
    frame
        .extend_from_slice(&header)
        .map_err(|_| CodecError::PayloadTooLarge)?;
    for &b in payload {
        frame
            .push(b ^ rand)
            .map_err(|_| CodecError::PayloadTooLarge)?;
    }
    let crc = crc8(&frame);
    frame.push(crc).map_err(|_| CodecError::PayloadTooLarge)?;
    Ok(frame)
}

/// Validate and unmask an inbound frame.
///
/// `session_key == 0` accepts any key (before the key exchange completes).
pub fn decode(bytes: &[u8], session_key: u8) -> Result<DecodedMessage, CodecError> {
    let n = bytes.len();
    if n <= FRAME_OVERHEAD {
        return Err(CodecError::TooShort);
    }

    let (body, crc) = bytes.split_at(n - 1);
    if crc8(body) != crc[0] {
        return Err(CodecError::CrcMismatch);
    }

    if u16::from_be_bytes([bytes[0], bytes[1]]) != STX {
        return Err(CodecError::BadMagic);
    }

    // Inbound frames top out one byte below the outbound limit.
    let len = bytes[2] as usize;
    if len >= MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLarge);
    }
    if n != FRAME_OVERHEAD + len {
        return Err(CodecError::LengthMismatch);
    }

    let rand = bytes[3].wrapping_sub(RAND_OFFSET);
    let key = bytes[4] ^ rand;
    if session_key != 0 && key != session_key {
        return Err(CodecError::KeyMismatch);
    }

    let cmd = bytes[5] ^ rand;
    let mut payload = Payload::new();
    for &b in &bytes[HEADER_LEN..HEADER_LEN + len] {
        // len < MAX_PAYLOAD_LEN, so this never overflows.
        payload
            .push(b ^ rand)
            .map_err(|_| CodecError::PayloadTooLarge)?;
    }

    Ok(DecodedMessage { cmd, key, payload })
}

// ───────────────────────────────────────────────────────────────
// Obfuscation byte source
// ───────────────────────────────────────────────────────────────

/// Per-frame random byte generator, seeded once from the monotonic clock.
pub struct ObfuscationRng {
    rng: StdRng,
}

impl ObfuscationRng {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn next_byte(&mut self) -> u8 {
        self.rng.r#gen::<u8>()
    }

    /// Encode with a freshly drawn obfuscation byte.
    pub fn encode(&mut self, session_key: u8, cmd: u8, payload: &[u8]) -> Result<Frame, CodecError> {
        let rand = self.next_byte();
        encode(session_key, cmd, payload, rand)
    }
}
