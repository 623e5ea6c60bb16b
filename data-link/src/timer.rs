//! Retransmit timer.
//!
//! Go-Back-N keeps one timer per session, covering the oldest unacknowledged
//! frame.  It is armed when the first frame enters an empty window, restarted
//! whenever an ACK slides the window, cancelled when the window drains, and
//! re-armed after every timeout.
//!
//! The timer is plain state: it stores a deadline and lets the session's
//! event loop sleep until it.  Every arm/restart/cancel bumps a generation
//! counter; an expiry observed for an older generation is stale and must be
//! ignored.  Together with the session loop handling ACKs before timer
//! expiry, this gives each ACK/timeout race exactly one outcome.
//!
//! With `backoff` enabled the RTO doubles on each consecutive timeout (capped
//! at `max_rto`) and returns to `initial_rto` on the next ACK.

use std::time::Duration;

use tokio::time::Instant;

/// Adjustable timeout parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// RTO used for a fresh window.
    pub initial_rto: Duration,
    /// Ceiling for the RTO after repeated back-off.
    pub max_rto: Duration,
    /// Double the RTO on consecutive timeouts.
    pub backoff: bool,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            initial_rto: Duration::from_millis(200),
            max_rto: Duration::from_secs(10),
            backoff: false,
        }
    }
}

/// Deadline-based retransmit timer for one session.
#[derive(Debug)]
pub struct RetransmitTimer {
    pub config: TimerConfig,
    current_rto: Duration,
    deadline: Option<Instant>,
    generation: u64,
}

impl RetransmitTimer {
    pub fn new(config: TimerConfig) -> Self {
        Self {
            current_rto: config.initial_rto,
            config,
            deadline: None,
            generation: 0,
        }
    }

    /// Arm the timer if it is not already running.
    pub fn arm(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.restart(now);
        }
    }

    /// Start a fresh countdown of the current RTO from `now`.
    pub fn restart(&mut self, now: Instant) {
        self.generation += 1;
        self.deadline = Some(now + self.current_rto);
    }

    pub fn cancel(&mut self) {
        if self.deadline.take().is_some() {
            self.generation += 1;
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Generation of the current countdown.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `true` when the countdown numbered `generation` is still the live one
    /// and has expired at `now`.
    pub fn is_expired(&self, generation: u64, now: Instant) -> bool {
        generation == self.generation && self.deadline.is_some_and(|d| d <= now)
    }

    pub fn current_rto(&self) -> Duration {
        self.current_rto
    }

    /// Double the RTO after a timeout, capped at `max_rto`.  No-op unless
    /// back-off is enabled.
    pub fn back_off(&mut self) {
        if self.config.backoff {
            self.current_rto = (self.current_rto * 2).min(self.config.max_rto);
        }
    }

    /// Return the RTO to its initial value (progress was made).
    pub fn reset(&mut self) {
        self.current_rto = self.config.initial_rto;
    }
}
