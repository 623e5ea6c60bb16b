//! Bit strings.
//!
//! Payloads and redundancy codes are sequences of bits.  At the API boundary
//! they are written as ASCII `'0'`/`'1'` text; [`BitString`] parses and
//! validates that text once so the rest of the crate never re-checks it.
//! [`BitString::to_packed`] gives the compact byte form used by the frame
//! wire codec; both forms describe the same bits.

use std::fmt;
use std::str::FromStr;

use crate::error::CodeError;

/// An ordered sequence of bits, most significant (leftmost) first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BitString {
    bits: Vec<bool>,
}

impl BitString {
    pub fn new() -> Self {
        Self::default()
    }

    /// `len` zero bits.
    pub fn zeros(len: usize) -> Self {
        Self {
            bits: vec![false; len],
        }
    }

    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index).copied()
    }

    pub fn count_ones(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    pub fn push(&mut self, bit: bool) {
        self.bits.push(bit);
    }

    /// `self ++ other` as a new string.
    pub fn concat(&self, other: &BitString) -> BitString {
        let mut bits = Vec::with_capacity(self.len() + other.len());
        bits.extend_from_slice(&self.bits);
        bits.extend_from_slice(&other.bits);
        BitString { bits }
    }

    /// Split into `[0, at)` and `[at, len)`.  `at` is clamped to `len`.
    pub fn split_at(&self, at: usize) -> (BitString, BitString) {
        let at = at.min(self.len());
        let (head, tail) = self.bits.split_at(at);
        (
            BitString::from_bits(head.to_vec()),
            BitString::from_bits(tail.to_vec()),
        )
    }

    /// Copy with bit `index` inverted.  Out-of-range indices return an
    /// unchanged copy.
    pub fn flipped(&self, index: usize) -> BitString {
        let mut out = self.clone();
        if let Some(bit) = out.bits.get_mut(index) {
            *bit = !*bit;
        }
        out
    }

    /// Pack into bytes, big-endian within each byte, zero-padded on the right.
    pub fn to_packed(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len().div_ceil(8)];
        for (i, &bit) in self.bits.iter().enumerate() {
            if bit {
                out[i / 8] |= 0x80 >> (i % 8);
            }
        }
        out
    }

    /// Inverse of [`to_packed`](Self::to_packed): read `len` bits from `bytes`.
    ///
    /// Returns `None` when `bytes` holds fewer than `len` bits.
    pub fn from_packed(bytes: &[u8], len: usize) -> Option<BitString> {
        if bytes.len() * 8 < len {
            return None;
        }
        let bits = (0..len)
            .map(|i| bytes[i / 8] & (0x80 >> (i % 8)) != 0)
            .collect();
        Some(BitString { bits })
    }
}

impl FromStr for BitString {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .enumerate()
            .map(|(position, c)| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                found => Err(CodeError::MalformedInput { position, found }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(BitString::from_bits)
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: String = self.bits.iter().map(|&b| if b { '1' } else { '0' }).collect();
        f.write_str(&text)
    }
}

impl From<Vec<bool>> for BitString {
    fn from(bits: Vec<bool>) -> Self {
        Self::from_bits(bits)
    }
}
