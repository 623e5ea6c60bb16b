//! CSMA/CD access control for a single sender.
//!
//! [`AccessController`] gates one station's use of the medium: it hands the
//! frame to the channel, and if the channel reports a collision it backs off
//! and tries again.  Any other outcome (delivered, lost, corrupted) means the
//! medium was acquired; whether the frame survived is the ARQ layer's
//! problem, not this one's.
//!
//! # Retry policy
//!
//! - [`BackoffPolicy::Immediate`] retries at once.  Collisions are memoryless
//!   (a fixed probability per attempt), so waiting changes nothing in the
//!   simulated medium.
//! - [`BackoffPolicy::BinaryExponential`] waits `r × slot` after the n-th
//!   collision, `r` uniform in `[0, 2^min(n, max_exponent))`, as IEEE 802.3
//!   does.  Only [`AccessController::attempt_async`] sleeps.
//!
//! `max_retries: None` retries forever.  Under a permanently jammed medium
//! that never returns, so the default caps retries at 15 (16 attempts).

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::channel::ChannelEvent;
use crate::state::AccessState;

/// Delay between collision and the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffPolicy {
    #[default]
    Immediate,
    BinaryExponential { slot: Duration, max_exponent: u32 },
}

/// Access controller settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessConfig {
    /// Retries allowed after the first attempt; `None` = unbounded.
    pub max_retries: Option<u32>,
    pub backoff: BackoffPolicy,
    /// Seed for back-off slot selection.
    pub seed: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            max_retries: Some(15),
            backoff: BackoffPolicy::Immediate,
            seed: 0,
        }
    }
}

/// Result of one [`AccessController::attempt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessOutcome {
    /// The medium was acquired on try number `attempts`; `event` is what the
    /// channel did with the frame.
    Sent { attempts: u32, event: ChannelEvent },
    /// Every try collided and the retry budget ran out.
    Aborted { attempts: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessStats {
    pub attempts: u64,
    pub collisions: u64,
    pub sent: u64,
    pub aborted: u64,
}

#[derive(Debug)]
pub struct AccessController {
    config: AccessConfig,
    state: AccessState,
    rng: ChaCha8Rng,
    stats: AccessStats,
}

impl AccessController {
    pub fn new(config: AccessConfig) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            state: AccessState::Idle,
            stats: AccessStats::default(),
        }
    }

    /// A controller that retries forever, immediately.
    pub fn unbounded() -> Self {
        Self::new(AccessConfig {
            max_retries: None,
            ..AccessConfig::default()
        })
    }

    pub fn state(&self) -> AccessState {
        self.state
    }

    pub fn stats(&self) -> AccessStats {
        self.stats
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    /// Try to put a frame on the medium, retrying immediately on collision.
    pub fn attempt<F>(&mut self, mut send: F) -> AccessOutcome
    where
        F: FnMut() -> ChannelEvent,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.try_once(&mut send, attempts) {
                Step::Done(outcome) => return outcome,
                Step::Retry => {}
            }
        }
    }

    /// Like [`attempt`](Self::attempt), but awaits the back-off delay between
    /// collisions.  Only the calling task waits.
    pub async fn attempt_async<F>(&mut self, send: F) -> AccessOutcome
    where
        F: FnMut() -> ChannelEvent,
    {
        self.attempt_async_until(send, || false).await
    }

    /// [`attempt_async`](Self::attempt_async) that gives up with
    /// [`AccessOutcome::Aborted`] once `cancelled` returns `true`.
    ///
    /// `cancelled` is checked after every collision.  A zero back-off still
    /// yields to the runtime, so an unbounded retry loop on a jammed medium
    /// never starves other tasks on the same thread.
    pub async fn attempt_async_until<F, C>(
        &mut self,
        mut send: F,
        mut cancelled: C,
    ) -> AccessOutcome
    where
        F: FnMut() -> ChannelEvent,
        C: FnMut() -> bool,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.try_once(&mut send, attempts) {
                Step::Done(outcome) => return outcome,
                Step::Retry if cancelled() => {
                    self.state = AccessState::Idle;
                    self.stats.aborted += 1;
                    log::debug!("[csma] cancelled after {attempts} colliding attempts");
                    return AccessOutcome::Aborted { attempts };
                }
                Step::Retry => {
                    let delay = self.backoff_delay(attempts);
                    if delay.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        log::trace!("[csma] backing off {delay:?}");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Back-off before the next try, after `collisions` consecutive collisions.
    pub fn backoff_delay(&mut self, collisions: u32) -> Duration {
        match self.config.backoff {
            BackoffPolicy::Immediate => Duration::ZERO,
            BackoffPolicy::BinaryExponential { slot, max_exponent } => {
                let k = collisions.min(max_exponent).min(16);
                let slots: u32 = self.rng.random_range(0..(1u32 << k));
                slot.saturating_mul(slots)
            }
        }
    }

    fn try_once<F>(&mut self, send: &mut F, attempts: u32) -> Step
    where
        F: FnMut() -> ChannelEvent,
    {
        self.state = AccessState::Transmitting;
        self.stats.attempts += 1;

        let event = send();
        if !event.is_collision() {
            self.state = AccessState::Idle;
            self.stats.sent += 1;
            if attempts > 1 {
                log::debug!("[csma] medium acquired after {attempts} attempts");
            }
            return Step::Done(AccessOutcome::Sent { attempts, event });
        }

        self.stats.collisions += 1;
        self.state = AccessState::Backoff;
        log::debug!("[csma] collision on attempt {attempts}; retrying");

        if self.config.max_retries.is_some_and(|max| attempts > max) {
            self.state = AccessState::Idle;
            self.stats.aborted += 1;
            log::warn!("[csma] giving up after {attempts} colliding attempts");
            return Step::Done(AccessOutcome::Aborted { attempts });
        }
        Step::Retry
    }
}

enum Step {
    Done(AccessOutcome),
    Retry,
}
