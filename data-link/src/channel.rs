//! Unreliable transmission media.
//!
//! Real links drop frames, flip bits and collide with other stations.  To
//! exercise the ARQ and CSMA/CD machinery without a physical medium, a
//! [`Channel`] decides the fate of every frame handed to it:
//!
//! | Outcome                     | Meaning                                  |
//! |-----------------------------|------------------------------------------|
//! | [`ChannelEvent::Delivered`] | Frame arrives unchanged.                 |
//! | [`ChannelEvent::Lost`]      | Nothing arrives; no notification.        |
//! | [`ChannelEvent::Corrupted`] | Frame arrives with one bit flipped.      |
//! | [`ChannelEvent::Collision`] | Another transmission was detected.       |
//!
//! Two implementations:
//! - [`SimulatedChannel`] draws every outcome from an injected RNG (seeded
//!   ChaCha8 by default), so a run is reproducible from its seed.
//! - [`ScriptedChannel`] replays a fixed list of [`Fault`]s, for tests that
//!   need an exact outcome sequence.

use std::collections::VecDeque;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::LinkError;
use crate::frame::Frame;

/// Outcome of one transmission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Delivered(Frame),
    Lost,
    /// Delivered, but with flipped bits.
    Corrupted(Frame),
    /// Concurrent transmission detected; nothing was delivered.
    Collision,
}

impl ChannelEvent {
    /// The frame that reached the far end, if any.
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            ChannelEvent::Delivered(f) | ChannelEvent::Corrupted(f) => Some(f),
            ChannelEvent::Lost | ChannelEvent::Collision => None,
        }
    }

    pub fn is_collision(&self) -> bool {
        matches!(self, ChannelEvent::Collision)
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            ChannelEvent::Delivered(_) => "delivered",
            ChannelEvent::Lost => "lost",
            ChannelEvent::Corrupted(_) => "corrupted",
            ChannelEvent::Collision => "collision",
        }
    }
}

/// A medium that carries frames for exactly one session.
pub trait Channel: Send {
    fn transmit(&mut self, frame: &Frame) -> ChannelEvent;

    fn stats(&self) -> ChannelStats;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn transmit(&mut self, frame: &Frame) -> ChannelEvent {
        (**self).transmit(frame)
    }

    fn stats(&self) -> ChannelStats {
        (**self).stats()
    }
}

/// Running totals of channel outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub transmissions: u64,
    pub delivered: u64,
    pub lost: u64,
    pub corrupted: u64,
    pub collisions: u64,
}

impl ChannelStats {
    fn record(&mut self, event: &ChannelEvent) {
        self.transmissions += 1;
        match event {
            ChannelEvent::Delivered(_) => self.delivered += 1,
            ChannelEvent::Lost => self.lost += 1,
            ChannelEvent::Corrupted(_) => self.corrupted += 1,
            ChannelEvent::Collision => self.collisions += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// SimulatedChannel
// ---------------------------------------------------------------------------

/// Fault probabilities, each in `[0.0, 1.0]`, summing to at most 1.
///
/// One uniform draw per transmission is compared against the cumulative
/// rates in the order collision, loss, corruption; the remainder is delivery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfig {
    pub collision_rate: f64,
    pub loss_rate: f64,
    pub corruption_rate: f64,
}

impl ChannelConfig {
    /// No faults.
    pub fn perfect() -> Self {
        Self {
            collision_rate: 0.0,
            loss_rate: 0.0,
            corruption_rate: 0.0,
        }
    }

    /// Half of all frames lost: exercises the ARQ timeout path.
    pub fn arq_default() -> Self {
        Self {
            loss_rate: 0.5,
            ..Self::perfect()
        }
    }

    /// One transmission in ten collides: exercises the CSMA/CD retry path.
    pub fn csma_default() -> Self {
        Self {
            collision_rate: 0.10,
            ..Self::perfect()
        }
    }

    pub fn validate(&self) -> Result<(), LinkError> {
        let rates = [
            ("collision_rate", self.collision_rate),
            ("loss_rate", self.loss_rate),
            ("corruption_rate", self.corruption_rate),
        ];
        for (name, rate) in rates {
            if !(0.0..=1.0).contains(&rate) {
                return Err(LinkError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {rate}"
                )));
            }
        }
        let total = self.collision_rate + self.loss_rate + self.corruption_rate;
        if total > 1.0 {
            return Err(LinkError::InvalidConfig(format!(
                "fault rates sum to {total}, more than 1"
            )));
        }
        Ok(())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::arq_default()
    }
}

/// A channel whose outcomes come from a random source.
#[derive(Debug)]
pub struct SimulatedChannel<R = ChaCha8Rng> {
    config: ChannelConfig,
    rng: R,
    stats: ChannelStats,
}

impl SimulatedChannel<ChaCha8Rng> {
    /// Seeded ChaCha8 source: the same seed replays the same outcomes.
    pub fn seeded(config: ChannelConfig, seed: u64) -> Result<Self, LinkError> {
        Self::with_rng(config, ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: RngCore> SimulatedChannel<R> {
    pub fn with_rng(config: ChannelConfig, rng: R) -> Result<Self, LinkError> {
        config.validate()?;
        Ok(Self {
            config,
            rng,
            stats: ChannelStats::default(),
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }
}

impl<R: RngCore + Send> Channel for SimulatedChannel<R> {
    fn transmit(&mut self, frame: &Frame) -> ChannelEvent {
        let c = self.config;
        let draw: f64 = self.rng.random();

        let event = if draw < c.collision_rate {
            ChannelEvent::Collision
        } else if draw < c.collision_rate + c.loss_rate {
            ChannelEvent::Lost
        } else if draw < c.collision_rate + c.loss_rate + c.corruption_rate
            && frame.codeword_len() > 0
        {
            let bit = self.rng.random_range(0..frame.codeword_len());
            ChannelEvent::Corrupted(frame.with_flipped_bit(bit))
        } else {
            ChannelEvent::Delivered(frame.clone())
        };

        log::trace!("[channel] seq={} {}", frame.seq, event.label());
        self.stats.record(&event);
        event
    }

    fn stats(&self) -> ChannelStats {
        self.stats
    }
}

// ---------------------------------------------------------------------------
// ScriptedChannel
// ---------------------------------------------------------------------------

/// One scripted channel decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Deliver,
    Lose,
    /// Deliver with codeword bit `bit` flipped.  Indices past the end wrap
    /// around the codeword; an empty codeword is delivered untouched.
    Corrupt { bit: usize },
    Collide,
}

/// A channel that replays a fixed list of faults, then delivers everything.
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    script: VecDeque<Fault>,
    stats: ChannelStats,
}

impl ScriptedChannel {
    pub fn new(script: impl IntoIterator<Item = Fault>) -> Self {
        Self {
            script: script.into_iter().collect(),
            stats: ChannelStats::default(),
        }
    }

    /// A channel that never faults.
    pub fn reliable() -> Self {
        Self::default()
    }

    /// Append more decisions to the end of the script.
    pub fn extend(&mut self, faults: impl IntoIterator<Item = Fault>) {
        self.script.extend(faults);
    }

    /// Decisions not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Channel for ScriptedChannel {
    fn transmit(&mut self, frame: &Frame) -> ChannelEvent {
        let event = match self.script.pop_front().unwrap_or(Fault::Deliver) {
            Fault::Deliver => ChannelEvent::Delivered(frame.clone()),
            Fault::Lose => ChannelEvent::Lost,
            Fault::Corrupt { bit } => match frame.codeword_len() {
                0 => ChannelEvent::Delivered(frame.clone()),
                len => ChannelEvent::Corrupted(frame.with_flipped_bit(bit % len)),
            },
            Fault::Collide => ChannelEvent::Collision,
        };
        log::trace!("[channel] seq={} {} (scripted)", frame.seq, event.label());
        self.stats.record(&event);
        event
    }

    fn stats(&self) -> ChannelStats {
        self.stats
    }
}
