//! Error types for the data-link core.
//!
//! Nothing here is fatal to the process.  Every failure is local to one call
//! or one session:
//! - [`CodeError`] rejects a single encode/verify request or a bad CRC key.
//! - [`LinkError`] covers stale ACKs, bad configuration and closed sessions.
//!
//! Back-pressure ([`crate::gbn_sender::SendOutcome::WindowFull`]) and channel
//! faults ([`crate::channel::ChannelEvent`]) are ordinary values, not errors:
//! they drive retransmission and never abort a session.

use thiserror::Error;

/// Errors raised while parsing bit strings or building an error-detection code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodeError {
    /// Input contained a character other than '0' or '1'.
    #[error("malformed bit string: {found:?} at position {position}")]
    MalformedInput { position: usize, found: char },

    /// The CRC generator cannot provide a usable check.
    #[error("invalid CRC key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },
}

/// Errors raised by the ARQ state machines and the session layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error(transparent)]
    Code(#[from] CodeError),

    /// Cumulative ACK outside `[base, next)`: stale or premature.
    #[error("invalid ack {ack}: window is [{base}, {next})")]
    InvalidAck { ack: u64, base: u64, next: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A transfer run hit its round limit with frames still outstanding.
    #[error("transfer stalled after {rounds} rounds with {outstanding} frame(s) unacknowledged")]
    Stalled { rounds: usize, outstanding: usize },

    /// The station's background tasks have stopped.
    #[error("session closed")]
    SessionClosed,
}

/// Errors that can arise when decoding a frame from its wire form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer shorter than the fixed header.
    #[error("buffer too short to contain a frame header")]
    BufferTooShort,

    /// Bit counts in the header disagree with the remaining bytes.
    #[error("header bit counts do not match remaining bytes")]
    LengthMismatch,

    /// Payload or code too long for its header bit-count field.
    #[error("frame too long to encode: {payload_bits} payload bits, {code_bits} code bits")]
    TooLong { payload_bits: usize, code_bits: usize },
}
