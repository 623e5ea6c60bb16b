//! Go-Back-N send-side state machine.
//!
//! [`GbnSender`] maintains a sliding window of up to `N` in-flight frames.
//!
//! # Protocol contract
//!
//! - At most `window_size` frames may be in flight at once; a full window
//!   hands the payload back as [`SendOutcome::WindowFull`] instead of
//!   blocking.
//! - ACKs are **cumulative**: `ack = K` acknowledges every frame with
//!   sequence number ≤ `K`.  An ACK outside `[base, next)` is stale or
//!   premature and is rejected with [`LinkError::InvalidAck`].
//! - On timeout the **whole** window `[base, next)` is retransmitted in
//!   ascending order (go back to N), each frame rebuilt from its buffered
//!   payload.
//! - Sequence numbers are `u64` and only ever increase; they are never reused.
//!
//! This module only manages state; channel access is the caller's
//! responsibility.

use std::collections::BTreeMap;

use crate::bits::BitString;
use crate::error::LinkError;
use crate::error_code::ErrorCode;
use crate::frame::Frame;
use crate::state::SenderState;

// ---------------------------------------------------------------------------
// GbnEntry
// ---------------------------------------------------------------------------

/// A single in-flight frame occupying one slot in the window.
#[derive(Debug, Clone)]
pub struct GbnEntry {
    pub payload: BitString,
    /// Total number of times this frame has been transmitted.
    pub tx_count: u32,
}

/// Result of [`GbnSender::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The frame was numbered and buffered; transmit it.
    Queued(Frame),
    /// No room in the window; the payload is handed back for a later retry.
    WindowFull(BitString),
}

/// Counters over the life of a sender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// First transmissions.
    pub frames_sent: u64,
    /// Frames resent by a timeout.
    pub retransmissions: u64,
    pub timeouts: u64,
    /// Frames released by cumulative ACKs.
    pub acked: u64,
    pub invalid_acks: u64,
}

impl SenderStats {
    /// Every frame put on the wire, first sends and resends alike.
    pub fn total_transmissions(&self) -> u64 {
        self.frames_sent + self.retransmissions
    }
}

// ---------------------------------------------------------------------------
// GbnSender
// ---------------------------------------------------------------------------

/// Go-Back-N send-side state for one session.
///
/// # Sequence-number layout
///
/// ```text
///    base               next
///      │                  │
///  ────┼──────────────────┼──────────────────▶ seq space
///      │ <── in flight ──▶│ <── sendable ───▶
/// ```
#[derive(Debug)]
pub struct GbnSender {
    /// Oldest unacknowledged sequence number (left window edge).
    base: u64,
    /// Sequence number for the next new frame.
    next: u64,
    window_size: usize,
    /// Keys are exactly `[base, next)`.
    in_flight: BTreeMap<u64, GbnEntry>,
    code: ErrorCode,
    state: SenderState,
    stats: SenderStats,
}

impl GbnSender {
    /// `initial_seq` numbers the first frame; `window_size` is N (≥ 1).
    pub fn new(initial_seq: u64, window_size: usize, code: ErrorCode) -> Result<Self, LinkError> {
        if window_size == 0 {
            return Err(LinkError::InvalidConfig(
                "window_size must be at least 1".into(),
            ));
        }
        Ok(Self {
            base: initial_seq,
            next: initial_seq,
            window_size,
            in_flight: BTreeMap::new(),
            code,
            state: SenderState::Idle,
            stats: SenderStats::default(),
        })
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn next_seq(&self) -> u64 {
        self.next
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    pub fn code(&self) -> &ErrorCode {
        &self.code
    }

    /// Number of frames awaiting acknowledgement (`next − base`).
    pub fn in_flight(&self) -> usize {
        (self.next - self.base) as usize
    }

    /// `true` when there is room for at least one more in-flight frame.
    pub fn can_send(&self) -> bool {
        self.in_flight() < self.window_size
    }

    pub fn has_unacked(&self) -> bool {
        self.next > self.base
    }

    /// Sequence numbers currently in flight, ascending.
    pub fn outstanding(&self) -> impl Iterator<Item = u64> + '_ {
        self.in_flight.keys().copied()
    }

    pub fn entry(&self, seq: u64) -> Option<&GbnEntry> {
        self.in_flight.get(&seq)
    }

    /// Number, buffer and return a new frame, or hand the payload back when
    /// the window is full.
    pub fn send(&mut self, payload: BitString) -> SendOutcome {
        if !self.can_send() {
            log::trace!(
                "[gbn] window full ({}/{}); payload refused",
                self.in_flight(),
                self.window_size
            );
            return SendOutcome::WindowFull(payload);
        }

        let seq = self.next;
        let frame = Frame::new(seq, payload.clone(), &self.code);
        self.in_flight.insert(seq, GbnEntry { payload, tx_count: 1 });
        self.next += 1;
        self.stats.frames_sent += 1;
        self.refresh_state();

        log::debug!(
            "[gbn] → FRAME seq={} in_flight={} state={}",
            seq,
            self.in_flight(),
            self.state
        );
        SendOutcome::Queued(frame)
    }

    /// Process a cumulative ACK.
    ///
    /// Releases every frame with sequence number ≤ `ack`, sets
    /// `base = ack + 1` and returns the number of frames released.
    pub fn on_ack(&mut self, ack: u64) -> Result<usize, LinkError> {
        if ack < self.base || ack >= self.next {
            self.stats.invalid_acks += 1;
            log::debug!(
                "[gbn] ← ACK {} ignored: window is [{}, {})",
                ack,
                self.base,
                self.next
            );
            return Err(LinkError::InvalidAck {
                ack,
                base: self.base,
                next: self.next,
            });
        }

        let remaining = self.in_flight.split_off(&(ack + 1));
        let released = std::mem::replace(&mut self.in_flight, remaining).len();
        self.base = ack + 1;
        self.stats.acked += released as u64;
        self.refresh_state();

        log::debug!(
            "[gbn] ← ACK {} released={} base={} state={}",
            ack,
            released,
            self.base,
            self.state
        );
        Ok(released)
    }

    /// Go-Back-N timeout: rebuild every frame in `[base, next)`, ascending,
    /// from its buffered payload.
    ///
    /// Returns an empty vector when nothing is in flight.
    pub fn on_timeout(&mut self) -> Vec<Frame> {
        if self.in_flight.is_empty() {
            return Vec::new();
        }

        let frames: Vec<Frame> = self
            .in_flight
            .iter_mut()
            .map(|(&seq, entry)| {
                entry.tx_count += 1;
                Frame::new(seq, entry.payload.clone(), &self.code)
            })
            .collect();

        self.stats.timeouts += 1;
        self.stats.retransmissions += frames.len() as u64;
        self.state = SenderState::AwaitingTimeout;

        log::debug!(
            "[gbn] timeout; retransmitting [{}, {}) ({} frame(s))",
            self.base,
            self.next,
            frames.len()
        );
        frames
    }

    /// Discard the window without transmitting anything.
    ///
    /// `base` jumps to `next`: abandoned sequence numbers are never reused.
    pub fn teardown(&mut self) -> usize {
        let discarded = self.in_flight.len();
        self.in_flight.clear();
        self.base = self.next;
        self.state = SenderState::Idle;
        if discarded > 0 {
            log::debug!("[gbn] teardown discarded {discarded} in-flight frame(s)");
        }
        discarded
    }

    fn refresh_state(&mut self) {
        self.state = if !self.has_unacked() {
            SenderState::Idle
        } else if self.state == SenderState::AwaitingTimeout {
            SenderState::AwaitingTimeout
        } else if self.can_send() {
            SenderState::WindowOpen
        } else {
            SenderState::WindowFull
        };
        debug_assert_eq!(self.in_flight.len(), self.in_flight());
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
