//! Deterministic Go-Back-N transfer over a simulated channel.
//!
//! [`Simulation`] runs a sender, a receiver, a CSMA/CD controller and a
//! channel in lock-step rounds, without a runtime or wall-clock timers.  One
//! round is:
//!
//! 1. fill the window with new frames, each through CSMA/CD + channel;
//! 2. hand every frame that arrived to the receiver and collect its ACKs;
//! 3. apply the ACKs in arrival order;
//! 4. if frames are still outstanding and no ACK advanced the window this
//!    round, the retransmit timer expires: the whole window `[base, next)` is
//!    resent and its ACKs applied.
//!
//! A round in which the window slid restarts the timer, so the sender keeps
//! filling the window until the oldest frame has really gone unanswered.
//! Given a seeded or scripted channel the run is fully reproducible, which
//! makes this the harness for checking retransmission order.

use std::collections::VecDeque;

use crate::bits::BitString;
use crate::channel::Channel;
use crate::config::LinkConfig;
use crate::csma::{AccessController, AccessOutcome};
use crate::error::LinkError;
use crate::frame::Frame;
use crate::gbn_receiver::{GbnReceiver, ReceiverAction};
use crate::gbn_sender::{GbnSender, SendOutcome};

/// Rounds allowed before a run is declared stalled.
pub const DEFAULT_MAX_ROUNDS: usize = 10_000;

/// Summary of one [`Simulation::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Frames put on the medium, first sends and resends alike:
    /// `first_sends + retransmissions`.
    pub total_transmissions: u64,
    /// First transmissions that reached the medium.
    pub first_sends: u64,
    /// Timeout resends that reached the medium.
    pub retransmissions: u64,
    pub timeouts: u64,
    pub rounds: usize,
    /// Sequence number of every frame put on the medium, in order.
    pub trace: Vec<u64>,
    /// Payloads accepted by the receiver, in order.
    pub delivered: Vec<BitString>,
    pub collisions: u64,
    /// Transmissions abandoned by CSMA/CD and never put on the medium; ARQ
    /// recovers them by timeout.
    pub access_aborts: u64,
    pub invalid_acks: u64,
}

pub struct Simulation<C> {
    sender: GbnSender,
    receiver: GbnReceiver,
    controller: AccessController,
    channel: C,
    max_rounds: usize,
    trace: Vec<u64>,
    first_sends: u64,
    resends: u64,
    delivered: Vec<BitString>,
}

impl<C: Channel> Simulation<C> {
    pub fn new(config: &LinkConfig, channel: C) -> Result<Self, LinkError> {
        config.validate()?;
        let sender = GbnSender::new(config.initial_seq, config.window_size, config.code.clone())?;
        let mut receiver = GbnReceiver::new(config.initial_seq, config.code.clone());
        receiver.set_reack(config.reack);
        Ok(Self {
            sender,
            receiver,
            controller: AccessController::new(config.access),
            channel,
            max_rounds: DEFAULT_MAX_ROUNDS,
            trace: Vec::new(),
            first_sends: 0,
            resends: 0,
            delivered: Vec::new(),
        })
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn sender(&self) -> &GbnSender {
        &self.sender
    }

    pub fn receiver(&self) -> &GbnReceiver {
        &self.receiver
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Transfer every payload, returning once all are acknowledged.
    pub fn run<I>(&mut self, payloads: I) -> Result<TransferReport, LinkError>
    where
        I: IntoIterator<Item = BitString>,
    {
        let mut pending: VecDeque<BitString> = payloads.into_iter().collect();
        let mut rounds = 0usize;

        while !pending.is_empty() || self.sender.has_unacked() {
            if rounds >= self.max_rounds {
                log::warn!(
                    "[sim] stalled after {rounds} rounds; window [{}, {})",
                    self.sender.base(),
                    self.sender.next_seq()
                );
                return Err(LinkError::Stalled {
                    rounds,
                    outstanding: self.sender.in_flight(),
                });
            }
            rounds += 1;

            let mut acks = Vec::new();
            while let Some(payload) = pending.pop_front() {
                match self.sender.send(payload) {
                    SendOutcome::Queued(frame) => self.transmit(&frame, false, &mut acks),
                    SendOutcome::WindowFull(payload) => {
                        pending.push_front(payload);
                        break;
                    }
                }
            }
            let progressed = self.apply_acks(acks);

            if self.sender.has_unacked() && !progressed {
                log::debug!("[sim] round {rounds}: timeout");
                let mut acks = Vec::new();
                for frame in self.sender.on_timeout() {
                    self.transmit(&frame, true, &mut acks);
                }
                self.apply_acks(acks);
            }
        }

        Ok(self.report(rounds))
    }

    fn transmit(&mut self, frame: &Frame, resend: bool, acks: &mut Vec<u64>) {
        let channel = &mut self.channel;
        match self.controller.attempt(|| channel.transmit(frame)) {
            AccessOutcome::Sent { event, .. } => {
                self.trace.push(frame.seq);
                if resend {
                    self.resends += 1;
                } else {
                    self.first_sends += 1;
                }
                let Some(arrived) = event.into_frame() else {
                    return;
                };
                match self.receiver.on_frame(&arrived) {
                    ReceiverAction::Ack(seq) | ReceiverAction::Drop { reack: Some(seq) } => {
                        acks.push(seq)
                    }
                    ReceiverAction::Drop { reack: None } => {}
                }
                self.delivered.extend(self.receiver.take_delivered());
            }
            AccessOutcome::Aborted { attempts } => {
                log::debug!("[sim] seq={} abandoned after {attempts} collisions", frame.seq);
            }
        }
    }

    /// Apply ACKs in order; `true` when any of them slid the window.
    fn apply_acks(&mut self, acks: Vec<u64>) -> bool {
        let mut progressed = false;
        for ack in acks {
            if let Ok(released) = self.sender.on_ack(ack) {
                progressed |= released > 0;
            }
        }
        progressed
    }

    fn report(&mut self, rounds: usize) -> TransferReport {
        let sender = self.sender.stats();
        let access = self.controller.stats();
        let report = TransferReport {
            total_transmissions: self.trace.len() as u64,
            first_sends: self.first_sends,
            retransmissions: self.resends,
            timeouts: sender.timeouts,
            rounds,
            trace: std::mem::take(&mut self.trace),
            delivered: std::mem::take(&mut self.delivered),
            collisions: access.collisions,
            access_aborts: access.aborted,
            invalid_acks: sender.invalid_acks,
        };
        log::info!(
            "[sim] {} payload(s) delivered in {} round(s): {} transmissions, {} timeouts",
            report.delivered.len(),
            report.rounds,
            report.total_transmissions,
            report.timeouts
        );
        report
    }
}
