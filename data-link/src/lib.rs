//! `data-link`: reliability and access control for a simulated data-link layer.
//!
//! # Architecture
//!
//! ```text
//!  payload ──▶ ┌────────────┐  Frame  ┌──────────────┐  ChannelEvent  ┌─────────┐
//!              │ GbnSender  │────────▶│ Access       │───────────────▶│ Channel │
//!              │ (window)   │         │ Controller   │  collision ⟲   └────┬────┘
//!              └─────▲──────┘         │ (CSMA/CD)    │                     │
//!                    │                └──────────────┘          delivered / corrupted
//!                    │ cumulative ACK                                      │
//!              ┌─────┴──────┐                                              │
//!              │GbnReceiver │◀─────────────────────────────────────────────┘
//!              │(CRC check) │──▶ on_delivery(payload)
//!              └────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`bits`]          validated bit strings (ASCII and packed forms)
//! - [`error_code`]    CRC and parity encode / verify
//! - [`frame`]         sequenced frames and their wire form
//! - [`channel`]       seeded and scripted lossy media
//! - [`csma`]          CSMA/CD access controller for one sender
//! - [`gbn_sender`]    Go-Back-N outbound window state machine
//! - [`gbn_receiver`]  Go-Back-N inbound cumulative-ACK state machine
//! - [`state`]         finite-state-machine types
//! - [`timer`]         retransmit timer
//! - [`simulation`]    deterministic round-based transfer runs
//! - [`session`]       async stations on tokio
//! - [`config`]        per-link settings
//! - [`error`]         error taxonomy

pub mod bits;
pub mod channel;
pub mod config;
pub mod csma;
pub mod error;
pub mod error_code;
pub mod frame;
pub mod gbn_receiver;
pub mod gbn_sender;
pub mod session;
pub mod simulation;
pub mod state;
pub mod timer;

pub use bits::BitString;
pub use channel::{Channel, ChannelConfig, ChannelEvent, Fault, ScriptedChannel, SimulatedChannel};
pub use config::LinkConfig;
pub use csma::{AccessConfig, AccessController, AccessOutcome, BackoffPolicy};
pub use error::{CodeError, FrameError, LinkError};
pub use error_code::{CrcKey, ErrorCode};
pub use frame::Frame;
pub use gbn_receiver::{GbnReceiver, ReceiverAction};
pub use gbn_sender::{GbnSender, SendOutcome};
pub use session::{Station, StationHandle, SubmitOutcome};
pub use simulation::{Simulation, TransferReport};
