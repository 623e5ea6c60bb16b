//! Go-Back-N receive-side state machine.
//!
//! [`GbnReceiver`] implements the receiver side of Go-Back-N:
//!
//! - Every frame's redundancy code is checked first; a damaged frame is
//!   dropped without an ACK so the sender times out and resends.
//! - Only the **in-order** frame (`seq == expected`) is accepted; its payload
//!   goes to the application and an `Ack(seq)` is returned.  Because ACKs are
//!   cumulative, `Ack(seq)` also covers every earlier frame.
//! - Out-of-order and duplicate frames are **discarded**, never buffered.
//!   With re-ACK enabled the receiver repeats its last cumulative ACK
//!   (`expected − 1`) so a sender whose ACK was lost can still advance.
//!
//! This module only manages state; carrying ACKs back is the caller's job.

use std::collections::VecDeque;

use crate::bits::BitString;
use crate::error_code::ErrorCode;
use crate::frame::Frame;

/// What the caller should do after [`GbnReceiver::on_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverAction {
    /// Frame accepted; send this cumulative ACK.
    Ack(u64),
    /// Frame discarded.  `reack` is the last cumulative ACK to repeat, if any.
    Drop { reack: Option<u64> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub accepted: u64,
    pub corrupted: u64,
    /// Ahead of `expected` (a gap) or behind it (a duplicate).
    pub out_of_order: u64,
}

type DeliveryFn = Box<dyn FnMut(BitString) + Send>;

enum Delivery {
    Buffer(VecDeque<BitString>),
    Callback(DeliveryFn),
}

/// Go-Back-N receive-side state for one session.
pub struct GbnReceiver {
    /// Next sequence number the receiver will accept.
    expected: u64,
    initial_seq: u64,
    code: ErrorCode,
    reack: bool,
    delivery: Delivery,
    stats: ReceiverStats,
}

impl std::fmt::Debug for GbnReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GbnReceiver")
            .field("expected", &self.expected)
            .field("code", &self.code)
            .field("reack", &self.reack)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl GbnReceiver {
    /// Receiver that buffers accepted payloads for [`take_delivered`].
    ///
    /// `initial_seq` must match the sender's first sequence number.
    ///
    /// [`take_delivered`]: Self::take_delivered
    pub fn new(initial_seq: u64, code: ErrorCode) -> Self {
        Self {
            expected: initial_seq,
            initial_seq,
            code,
            reack: true,
            delivery: Delivery::Buffer(VecDeque::new()),
            stats: ReceiverStats::default(),
        }
    }

    /// Receiver that hands each accepted payload to `on_delivery`, in order.
    pub fn with_delivery<F>(initial_seq: u64, code: ErrorCode, on_delivery: F) -> Self
    where
        F: FnMut(BitString) + Send + 'static,
    {
        Self {
            delivery: Delivery::Callback(Box::new(on_delivery)),
            ..Self::new(initial_seq, code)
        }
    }

    /// Enable or disable repeating the last ACK on out-of-order frames.
    pub fn set_reack(&mut self, reack: bool) {
        self.reack = reack;
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    /// Last cumulative ACK, or `None` before the first frame is accepted.
    pub fn last_ack(&self) -> Option<u64> {
        (self.expected > self.initial_seq).then(|| self.expected - 1)
    }

    /// Process an inbound frame.
    pub fn on_frame(&mut self, frame: &Frame) -> ReceiverAction {
        if !frame.is_intact(&self.code) {
            self.stats.corrupted += 1;
            log::debug!("[gbn] ← FRAME seq={} failed check; dropped", frame.seq);
            return ReceiverAction::Drop { reack: None };
        }

        if frame.seq != self.expected {
            self.stats.out_of_order += 1;
            let reack = if self.reack { self.last_ack() } else { None };
            log::debug!(
                "[gbn] ← FRAME seq={} expected={}; dropped (reack={:?})",
                frame.seq,
                self.expected,
                reack
            );
            return ReceiverAction::Drop { reack };
        }

        self.expected += 1;
        self.stats.accepted += 1;
        match &mut self.delivery {
            Delivery::Buffer(buf) => buf.push_back(frame.payload.clone()),
            Delivery::Callback(deliver) => deliver(frame.payload.clone()),
        }
        log::debug!("[gbn] ← FRAME seq={} accepted; → ACK {}", frame.seq, frame.seq);
        ReceiverAction::Ack(frame.seq)
    }

    /// Drain payloads buffered since the last call, oldest first.
    ///
    /// Always empty for a receiver built with [`with_delivery`](Self::with_delivery).
    pub fn take_delivered(&mut self) -> Vec<BitString> {
        match &mut self.delivery {
            Delivery::Buffer(buf) => buf.drain(..).collect(),
            Delivery::Callback(_) => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn code() -> ErrorCode {
        ErrorCode::crc("1101").unwrap()
    }

    fn frame(seq: u64, payload: &str) -> Frame {
        Frame::new(seq, payload.parse().unwrap(), &code())
    }

    #[test]
    fn initial_state() {
        let r = GbnReceiver::new(42, code());
        assert_eq!(r.expected(), 42);
        assert_eq!(r.last_ack(), None);
    }

    #[test]
    fn in_order_frame_accepted() {
        let mut r = GbnReceiver::new(0, code());
        assert_eq!(r.on_frame(&frame(0, "1010")), ReceiverAction::Ack(0));
        assert_eq!(r.expected(), 1);
        assert_eq!(r.take_delivered(), vec!["1010".parse().unwrap()]);
        assert!(r.take_delivered().is_empty());
    }

    #[test]
    fn corrupted_frame_dropped_without_ack() {
        let mut r = GbnReceiver::new(0, code());
        r.on_frame(&frame(0, "1"));
        let bad = frame(1, "1010101").with_flipped_bit(2);
        assert_eq!(r.on_frame(&bad), ReceiverAction::Drop { reack: None });
        assert_eq!(r.expected(), 1);
        assert_eq!(r.stats().corrupted, 1);
    }

    #[test]
    fn out_of_order_frame_discarded_with_reack() {
        let mut r = GbnReceiver::new(0, code());
        r.on_frame(&frame(0, "1"));

        // seq 1 lost; seq 2 arrives.
        assert_eq!(
            r.on_frame(&frame(2, "11")),
            ReceiverAction::Drop { reack: Some(0) }
        );
        assert_eq!(r.expected(), 1);
        assert_eq!(r.take_delivered().len(), 1);
    }

    #[test]
    fn out_of_order_before_any_accept_has_nothing_to_reack() {
        let mut r = GbnReceiver::new(0, code());
        assert_eq!(
            r.on_frame(&frame(3, "1")),
            ReceiverAction::Drop { reack: None }
        );
    }

    #[test]
    fn reack_can_be_disabled() {
        let mut r = GbnReceiver::new(0, code());
        r.set_reack(false);
        r.on_frame(&frame(0, "1"));
        assert_eq!(
            r.on_frame(&frame(5, "1")),
            ReceiverAction::Drop { reack: None }
        );
    }

    #[test]
    fn duplicate_frame_discarded_with_reack() {
        let mut r = GbnReceiver::new(10, code());
        r.on_frame(&frame(10, "1"));
        r.on_frame(&frame(11, "0"));

        assert_eq!(
            r.on_frame(&frame(10, "1")),
            ReceiverAction::Drop { reack: Some(11) }
        );
        assert_eq!(r.take_delivered().len(), 2);
        assert_eq!(r.stats().out_of_order, 1);
    }

    #[test]
    fn gap_then_fill_delivers_in_order() {
        let mut r = GbnReceiver::new(0, code());
        r.on_frame(&frame(1, "11"));
        assert_eq!(r.on_frame(&frame(0, "10")), ReceiverAction::Ack(0));
        assert_eq!(r.on_frame(&frame(1, "11")), ReceiverAction::Ack(1));
        let delivered: Vec<String> = r.take_delivered().iter().map(|b| b.to_string()).collect();
        assert_eq!(delivered, vec!["10", "11"]);
    }

    #[test]
    fn delivery_callback_receives_payloads_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut r = GbnReceiver::with_delivery(0, code(), move |p| {
            sink.lock().unwrap().push(p.to_string())
        });

        r.on_frame(&frame(0, "1"));
        r.on_frame(&frame(2, "111"));
        r.on_frame(&frame(1, "11"));
        r.on_frame(&frame(2, "111"));

        assert_eq!(*seen.lock().unwrap(), vec!["1", "11", "111"]);
        assert!(r.take_delivered().is_empty());
    }
}
