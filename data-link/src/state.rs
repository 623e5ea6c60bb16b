//! Finite-state-machine types.
//!
//! Transitions live with the machines that own them
//! ([`crate::gbn_sender::GbnSender`], [`crate::csma::AccessController`]);
//! this module only names the states so logging and snapshots can report them.

/// Go-Back-N sender states.
///
/// ```text
//   Idle ──send──▶ WindowOpen ──next−base = N──▶ WindowFull
//    ▲                 │  ▲                          │
//    │                 │  └───────────ack────────────┘
//    │              timeout (frames outstanding)
//    │                 ▼
//    └──base = next── AwaitingTimeout
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// Nothing in flight.
    #[default]
    Idle,
    /// Frames in flight and room for more.
    WindowOpen,
    /// `next − base == window_size`; `send` returns `WindowFull`.
    WindowFull,
    /// A timeout fired with frames outstanding; held until the window drains.
    AwaitingTimeout,
}

/// CSMA/CD access controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessState {
    #[default]
    Idle,
    /// A transmission attempt is on the medium.
    Transmitting,
    /// A collision was detected; waiting before the next attempt.
    Backoff,
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::fmt::Display for AccessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
