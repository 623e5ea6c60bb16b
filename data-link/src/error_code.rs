//! Frame-level error detection: cyclic redundancy check and parity.
//!
//! An [`ErrorCode`] turns a payload into a codeword (`payload ++ redundancy`)
//! and checks a received codeword.  Both variants are pure transforms.
//!
//! # CRC
//!
//! With a generator key of `k` bits the redundancy is the `k − 1` bit
//! remainder of modulo-2 division of `payload ++ 0^(k−1)` by the key.  A
//! codeword verifies when its own remainder is all zeros.
//!
//! Detection limits: every single-bit error is caught (the key has at least
//! two terms), as is every burst no longer than `k − 1` bits.  Longer bursts
//! whose pattern happens to be a multiple of the key slip through.
//!
//! # Parity
//!
//! One even-parity bit.  Catches every error of odd weight, misses every
//! error of even weight.

use crate::bits::BitString;
use crate::error::CodeError;

/// A validated CRC generator polynomial, leading coefficient first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrcKey {
    bits: BitString,
}

impl CrcKey {
    /// Parse and validate a generator key such as `"1101"` (x³ + x² + 1).
    pub fn new(key: &str) -> Result<Self, CodeError> {
        let bits: BitString = key.parse()?;
        Self::from_bits(bits)
    }

    pub fn from_bits(bits: BitString) -> Result<Self, CodeError> {
        let reject = |reason| CodeError::InvalidKey {
            key: bits.to_string(),
            reason,
        };
        if bits.len() < 2 {
            return Err(reject("key needs at least two bits; a 1-bit key checks nothing"));
        }
        if bits.get(0) != Some(true) {
            return Err(reject("leading coefficient must be 1"));
        }
        if bits.count_ones() < 2 {
            return Err(reject("key needs at least two terms to catch single-bit errors"));
        }
        Ok(Self { bits })
    }

    /// Number of redundancy bits (the polynomial degree).
    pub fn degree(&self) -> usize {
        self.bits.len() - 1
    }

    pub fn bits(&self) -> &BitString {
        &self.bits
    }

    /// Remainder of modulo-2 division of `dividend` by this key, exactly
    /// [`degree`](Self::degree) bits long.
    pub fn remainder(&self, dividend: &BitString) -> BitString {
        let key = self.bits.as_slice();
        let width = self.degree();
        let data = dividend.as_slice();

        if data.len() < key.len() {
            // Already smaller than the divisor: the dividend is the remainder.
            let mut out = vec![false; width - data.len()];
            out.extend_from_slice(data);
            return BitString::from_bits(out);
        }

        let mut work = data.to_vec();
        for i in 0..=(work.len() - key.len()) {
            if work[i] {
                for (w, &k) in work[i..i + key.len()].iter_mut().zip(key) {
                    *w ^= k;
                }
            }
        }
        BitString::from_bits(work.split_off(work.len() - width))
    }
}

/// The redundancy scheme carried by every frame of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    Crc(CrcKey),
    Parity,
}

impl ErrorCode {
    /// Shorthand for `ErrorCode::Crc(CrcKey::new(key)?)`.
    pub fn crc(key: &str) -> Result<Self, CodeError> {
        Ok(ErrorCode::Crc(CrcKey::new(key)?))
    }

    /// Bits of redundancy appended to every payload.
    pub fn redundancy_len(&self) -> usize {
        match self {
            ErrorCode::Crc(key) => key.degree(),
            ErrorCode::Parity => 1,
        }
    }

    /// Redundancy bits for `payload`.
    pub fn redundancy(&self, payload: &BitString) -> BitString {
        match self {
            ErrorCode::Crc(key) => {
                key.remainder(&payload.concat(&BitString::zeros(key.degree())))
            }
            ErrorCode::Parity => BitString::from_bits(vec![payload.count_ones() % 2 == 1]),
        }
    }

    /// `payload ++ redundancy(payload)`.
    pub fn encode(&self, payload: &BitString) -> BitString {
        payload.concat(&self.redundancy(payload))
    }

    /// `true` when `codeword` carries a consistent redundancy code.
    ///
    /// Codewords shorter than [`redundancy_len`](Self::redundancy_len) never
    /// verify.
    pub fn verify(&self, codeword: &BitString) -> bool {
        if codeword.len() < self.redundancy_len() {
            return false;
        }
        match self {
            ErrorCode::Crc(key) => key.remainder(codeword).count_ones() == 0,
            ErrorCode::Parity => {
                let (data, parity) = codeword.split_at(codeword.len() - 1);
                parity.get(0) == Some(data.count_ones() % 2 == 1)
            }
        }
    }

    /// [`encode`](Self::encode) over ASCII bit text.
    pub fn encode_str(&self, payload: &str) -> Result<String, CodeError> {
        let payload: BitString = payload.parse()?;
        Ok(self.encode(&payload).to_string())
    }

    /// [`verify`](Self::verify) over ASCII bit text.
    pub fn verify_str(&self, codeword: &str) -> Result<bool, CodeError> {
        let codeword: BitString = codeword.parse()?;
        Ok(self.verify(&codeword))
    }
}
