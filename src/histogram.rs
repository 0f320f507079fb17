//! Letter-frequency histogram engine.
//!
//! Counts ASCII letters case-insensitively into 26 buckets, `a` through `z`.
//! Every other byte (digits, punctuation, whitespace, non-ASCII) is ignored,
//! so the engine works on arbitrary binary input without decoding.
//!
//! # Invariants
//! - Output always has exactly [`ALPHABET_LEN`] buckets.
//! - The sum of all buckets equals the number of ASCII alphabetic bytes.
//! - `A` and `a` land in the same bucket.

use std::fmt;
use std::io::{self, Write};

/// Number of buckets in a histogram (`a`..=`z`).
pub const ALPHABET_LEN: usize = 26;

/// Per-letter occurrence counts.
///
/// Index 0 is `a`, index 25 is `z`. Immutable once built; copied by value
/// through the worker channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Histogram {
    counts: [u64; ALPHABET_LEN],
}

impl Histogram {
    /// Builds a histogram from raw bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut counts = [0u64; ALPHABET_LEN];
        for &b in data {
            if b.is_ascii_alphabetic() {
                counts[(b.to_ascii_lowercase() - b'a') as usize] += 1;
            }
        }
        Self { counts }
    }

    /// Wraps already-computed counts (used when decoding a payload frame).
    #[inline]
    pub const fn from_counts(counts: [u64; ALPHABET_LEN]) -> Self {
        Self { counts }
    }

    /// All 26 counts in alphabetical order.
    #[inline]
    pub fn counts(&self) -> &[u64; ALPHABET_LEN] {
        &self.counts
    }

    /// Count for `letter` (either case). Returns `None` for non-letters.
    pub fn get(&self, letter: char) -> Option<u64> {
        if !letter.is_ascii_alphabetic() {
            return None;
        }
        let idx = (letter.to_ascii_lowercase() as u8 - b'a') as usize;
        Some(self.counts[idx])
    }

    /// Total number of letters counted.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Iterates `(letter, count)` pairs from `a` to `z`.
    pub fn iter(&self) -> impl Iterator<Item = (char, u64)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .map(|(i, &c)| ((b'a' + i as u8) as char, c))
    }

    /// Writes the artifact body: one `letter=count` line per bucket.
    pub fn write_lines<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (letter, count) in self.iter() {
            writeln!(out, "{letter}={count}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::with_capacity(ALPHABET_LEN * 8);
        self.write_lines(&mut buf).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&buf))
    }
}
