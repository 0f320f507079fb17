//! Histogram payload frame carried over a worker channel.
//!
//! # Layout
//! A frame is fixed-size (216 bytes), all integers big-endian:
//! - magic `b"LHST"` (4)
//! - version (u16)
//! - bucket count (u16, always 26)
//! - 26 counts (u64 each), `a` first
//!
//! # Framing
//! A channel carries either nothing or exactly one frame. The reader treats
//! zero bytes as "no payload" and anything else that is not one complete,
//! valid frame as malformed.

use std::fmt;

use crate::histogram::{Histogram, ALPHABET_LEN};

/// Frame magic bytes.
const FRAME_MAGIC: [u8; 4] = *b"LHST";
/// Frame format version.
pub const FRAME_VERSION: u16 = 1;
/// Header length in bytes.
const HEADER_LEN: usize = 8;
/// Total encoded frame length.
pub const FRAME_LEN: usize = HEADER_LEN + ALPHABET_LEN * 8;

/// Errors decoding a payload frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum WireError {
    /// Byte count is neither zero nor exactly one frame.
    BadLength { got: usize },
    /// Magic bytes mismatch.
    BadMagic,
    /// Version not understood by this reader.
    UnsupportedVersion { got: u16 },
    /// Bucket count is not 26.
    BucketCount { got: u16 },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength { got } => {
                write!(f, "payload length {got} bytes (expected 0 or {FRAME_LEN})")
            }
            Self::BadMagic => write!(f, "payload magic mismatch"),
            Self::UnsupportedVersion { got } => {
                write!(f, "unsupported payload version {got} (expected {FRAME_VERSION})")
            }
            Self::BucketCount { got } => {
                write!(f, "payload carries {got} buckets (expected {ALPHABET_LEN})")
            }
        }
    }
}

impl std::error::Error for WireError {}

/// Encodes a histogram into one frame.
pub fn encode(hist: &Histogram) -> [u8; FRAME_LEN] {
    let mut out = [0u8; FRAME_LEN];
    out[0..4].copy_from_slice(&FRAME_MAGIC);
    out[4..6].copy_from_slice(&FRAME_VERSION.to_be_bytes());
    out[6..8].copy_from_slice(&(ALPHABET_LEN as u16).to_be_bytes());
    for (i, count) in hist.counts().iter().enumerate() {
        let at = HEADER_LEN + i * 8;
        out[at..at + 8].copy_from_slice(&count.to_be_bytes());
    }
    out
}

/// Decodes everything read from a channel.
///
/// Returns `Ok(None)` for an empty channel and `Ok(Some(_))` for exactly one
/// valid frame.
pub fn decode(bytes: &[u8]) -> Result<Option<Histogram>, WireError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    if bytes.len() != FRAME_LEN {
        return Err(WireError::BadLength { got: bytes.len() });
    }
    if bytes[0..4] != FRAME_MAGIC {
        return Err(WireError::BadMagic);
    }
    let version = u16::from_be_bytes([bytes[4], bytes[5]]);
    if version != FRAME_VERSION {
        return Err(WireError::UnsupportedVersion { got: version });
    }
    let buckets = u16::from_be_bytes([bytes[6], bytes[7]]);
    if buckets as usize != ALPHABET_LEN {
        return Err(WireError::BucketCount { got: buckets });
    }

    let mut counts = [0u64; ALPHABET_LEN];
    for (i, chunk) in bytes[HEADER_LEN..].chunks_exact(8).enumerate() {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(chunk);
        counts[i] = u64::from_be_bytes(raw);
    }
    Ok(Some(Histogram::from_counts(counts)))
}
