//! Frames and their wire form.
//!
//! A [`Frame`] is the unit the ARQ layer numbers, the channel carries and the
//! receiver checks.  Frames are immutable: a corrupted copy or a
//! retransmission is always a new value.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! +                    Sequence Number (64)                       +
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Payload Bit Count                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Code Bit Count        |   Packed codeword bits ...    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The codeword (`payload ++ code`) is packed MSB-first and zero-padded to a
//! whole byte.  Total header size: [`HEADER_LEN`] = 14 bytes.

use crate::bits::BitString;
use crate::error::FrameError;
use crate::error_code::ErrorCode;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 14;

const OFF_SEQ: usize = 0;
const OFF_PAYLOAD_BITS: usize = 8;
const OFF_CODE_BITS: usize = 12;

/// A sequenced payload with its redundancy code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub seq: u64,
    pub payload: BitString,
    /// Redundancy bits; length fixed by the [`ErrorCode`] that built the frame.
    pub code: BitString,
}

impl Frame {
    /// Build a frame, computing its redundancy with `code`.
    pub fn new(seq: u64, payload: BitString, code: &ErrorCode) -> Self {
        let redundancy = code.redundancy(&payload);
        Self {
            seq,
            payload,
            code: redundancy,
        }
    }

    /// `payload ++ code`: the bits that travel over the medium.
    pub fn codeword(&self) -> BitString {
        self.payload.concat(&self.code)
    }

    pub fn codeword_len(&self) -> usize {
        self.payload.len() + self.code.len()
    }

    /// `true` when the redundancy code still matches the payload.
    pub fn is_intact(&self, code: &ErrorCode) -> bool {
        code.verify(&self.codeword())
    }

    /// A copy with codeword bit `bit` inverted, split back into payload and
    /// code at the same boundary.
    pub fn with_flipped_bit(&self, bit: usize) -> Frame {
        let (payload, code) = self.codeword().flipped(bit).split_at(self.payload.len());
        Frame {
            seq: self.seq,
            payload,
            code,
        }
    }

    /// Serialise into a newly allocated byte vector.
    ///
    /// Fails with [`FrameError::TooLong`] when a bit count does not fit its
    /// header field.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let too_long = || FrameError::TooLong {
            payload_bits: self.payload.len(),
            code_bits: self.code.len(),
        };
        let payload_bits = u32::try_from(self.payload.len()).map_err(|_| too_long())?;
        let code_bits = u16::try_from(self.code.len()).map_err(|_| too_long())?;

        let packed = self.codeword().to_packed();
        let mut buf = vec![0u8; HEADER_LEN + packed.len()];

        buf[OFF_SEQ..OFF_SEQ + 8].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_PAYLOAD_BITS..OFF_PAYLOAD_BITS + 4].copy_from_slice(&payload_bits.to_be_bytes());
        buf[OFF_CODE_BITS..OFF_CODE_BITS + 2].copy_from_slice(&code_bits.to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&packed);

        Ok(buf)
    }

    /// Parse a [`Frame`] from a raw byte slice.
    ///
    /// The redundancy code is carried, not checked: integrity is the
    /// receiver's decision.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < HEADER_LEN {
            return Err(FrameError::BufferTooShort);
        }

        let mut seq = [0u8; 8];
        seq.copy_from_slice(&buf[OFF_SEQ..OFF_SEQ + 8]);
        let mut payload_bits = [0u8; 4];
        payload_bits.copy_from_slice(&buf[OFF_PAYLOAD_BITS..OFF_PAYLOAD_BITS + 4]);
        let mut code_bits = [0u8; 2];
        code_bits.copy_from_slice(&buf[OFF_CODE_BITS..OFF_CODE_BITS + 2]);

        let payload_len = u32::from_be_bytes(payload_bits) as usize;
        let code_len = u16::from_be_bytes(code_bits) as usize;
        let total = payload_len + code_len;

        let body = &buf[HEADER_LEN..];
        if body.len() != total.div_ceil(8) {
            return Err(FrameError::LengthMismatch);
        }
        let codeword = BitString::from_packed(body, total).ok_or(FrameError::LengthMismatch)?;
        let (payload, code) = codeword.split_at(payload_len);

        Ok(Frame {
            seq: u64::from_be_bytes(seq),
            payload,
            code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crc() -> ErrorCode {
        ErrorCode::crc("1101").unwrap()
    }

    fn make_frame(seq: u64, payload: &str) -> Frame {
        Frame::new(seq, payload.parse().unwrap(), &crc())
    }

    #[test]
    fn new_frame_carries_crc_remainder() {
        let f = make_frame(7, "1010101");
        assert_eq!(f.code.to_string(), "011");
        assert_eq!(f.codeword().to_string(), "1010101011");
        assert!(f.is_intact(&crc()));
    }

    #[test]
    fn flipped_bit_in_code_region_breaks_integrity() {
        let f = make_frame(0, "1010101");
        let bad = f.with_flipped_bit(8);
        assert_eq!(bad.payload, f.payload);
        assert_ne!(bad.code, f.code);
        assert!(!bad.is_intact(&crc()));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let f = make_frame(0x0102_0304_0506_0708, "110010111");
        let decoded = Frame::decode(&f.encode().unwrap()).unwrap();
        assert_eq!(decoded, f);
    }

    #[test]
    fn seq_big_endian_on_wire() {
        let bytes = make_frame(0x0102_0304_0506_0708, "1").encode().unwrap();
        assert_eq!(
            &bytes[OFF_SEQ..OFF_SEQ + 8],
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );
    }

    #[test]
    fn encoded_length_equals_header_plus_packed_bits() {
        // 7 payload bits + 3 code bits = 10 bits = 2 bytes.
        let bytes = make_frame(1, "1010101").encode().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 2);
    }

    #[test]
    fn decode_empty_buffer_returns_error() {
        assert_eq!(Frame::decode(&[]), Err(FrameError::BufferTooShort));
        assert_eq!(
            Frame::decode(&[0u8; HEADER_LEN - 1]),
            Err(FrameError::BufferTooShort)
        );
    }

    #[test]
    fn decode_truncated_body_returns_error() {
        let mut bytes = make_frame(3, "1010101").encode().unwrap();
        bytes.pop();
        assert_eq!(Frame::decode(&bytes), Err(FrameError::LengthMismatch));
    }

    #[test]
    fn empty_payload_frame_roundtrip() {
        let f = make_frame(9, "");
        assert_eq!(f.code.to_string(), "000");
        assert_eq!(Frame::decode(&f.encode().unwrap()).unwrap(), f);
    }

    #[test]
    fn oversized_code_is_rejected_not_truncated() {
        let f = Frame {
            seq: 0,
            payload: "1".parse().unwrap(),
            code: BitString::zeros(u16::MAX as usize + 1),
        };
        assert_eq!(
            f.encode(),
            Err(FrameError::TooLong {
                payload_bits: 1,
                code_bits: 65_536
            })
        );
    }
}
