//! The 16-byte framed-audio packet header for the `framed_packet` audio mode
//! (spec §4.1).
//!
//! ```text
//! offset  size  field
//! 0       1     magic          configurable per profile, default 0xA1
//! 1       1     version        default 1
//! 2       1     type           reserved, 0 = audio
//! 3       1     flags          reserved
//! 4       4     seq            big-endian u32
//! 8       4     timestamp_ms   big-endian u32
//! 12      4     payload_len    big-endian u32
//! ```
//!
//! `type`/`flags` carry no normative semantics (spec §9 open question); they
//! are decoded and surfaced to telemetry, never used to reject a frame.

use thiserror::Error;

pub const HEADER_LEN: usize = 16;
pub const DEFAULT_MAGIC: u8 = 0xA1;
pub const DEFAULT_VERSION: u8 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame shorter than the {HEADER_LEN}-byte header (got {0} bytes)")]
    TooShort(usize),

    #[error("magic byte mismatch: expected {expected:#04x}, got {actual:#04x}")]
    MagicMismatch { expected: u8, actual: u8 },

    #[error("payload_len {declared} exceeds remaining buffer ({available} bytes)")]
    PayloadOverflow { declared: u32, available: usize },
}

/// Decoded framed-audio header plus the header's declared payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u8,
    pub version: u8,
    pub frame_type: u8,
    pub flags: u8,
    pub seq: u32,
    pub timestamp_ms: u32,
    pub payload_len: u32,
}

impl FrameHeader {
    /// Decode the header from the front of `buf`, validating the declared
    /// `magic` byte and that `payload_len` does not exceed what follows the
    /// header in `buf`. Does not copy the payload; callers slice it
    /// themselves via [`Self::payload_range`].
    pub fn decode(buf: &[u8], expected_magic: u8) -> Result<Self, FrameError> {
        if buf.len() < HEADER_LEN {
            return Err(FrameError::TooShort(buf.len()));
        }

        let magic = buf[0];
        if magic != expected_magic {
            return Err(FrameError::MagicMismatch {
                expected: expected_magic,
                actual: magic,
            });
        }

        let version = buf[1];
        let frame_type = buf[2];
        let flags = buf[3];
        let seq = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let timestamp_ms = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let payload_len = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);

        let available = buf.len() - HEADER_LEN;
        if payload_len as usize > available {
            return Err(FrameError::PayloadOverflow {
                declared: payload_len,
                available,
            });
        }

        Ok(Self {
            magic,
            version,
            frame_type,
            flags,
            seq,
            timestamp_ms,
            payload_len,
        })
    }

    /// Byte range of this header's payload within the buffer it was decoded
    /// from.
    #[must_use]
    pub const fn payload_range(&self) -> std::ops::Range<usize> {
        HEADER_LEN..HEADER_LEN + self.payload_len as usize
    }

    /// Encode this header (not including the payload) to 16 bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.magic;
        out[1] = self.version;
        out[2] = self.frame_type;
        out[3] = self.flags;
        out[4..8].copy_from_slice(&self.seq.to_be_bytes());
        out[8..12].copy_from_slice(&self.timestamp_ms.to_be_bytes());
        out[12..16].copy_from_slice(&self.payload_len.to_be_bytes());
        out
    }

    /// Encode the header followed by `payload` into one contiguous buffer.
    #[must_use]
    pub fn encode_with_payload(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(&self.encode());
        out.extend_from_slice(payload);
        out
    }
}
