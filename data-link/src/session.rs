//! Async station: a Go-Back-N sender and receiver running as tokio tasks.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  submit / send / flush        StationHandle
//!      │  notify_ack / notify_timeout  ┌────────────────────┐
//!      ▼                               │ commands (mpsc)    │
//!  ┌──────────────────────────┐        │ deliveries (mpsc)  │
//!  │ sender task              │◀───────┴────────────────────┘
//!  │  GbnSender, timer,       │
//!  │  AccessController,       │── frames ──▶ ┌───────────────┐
//!  │  Channel                 │              │ receiver task │── on_delivery ──▶ app
//!  │                          │◀── ACKs ──── │  GbnReceiver  │
//!  └──────────────────────────┘              └───────────────┘
//! ```
//!
//! Every station owns its window, buffers, timer and channel; nothing is
//! shared between stations, so any number of them run side by side.
//!
//! # Event ordering
//!
//! The sender task multiplexes ACKs, application commands and the retransmit
//! timer in one `select!` with `biased;` ordering: an ACK that is ready when
//! the timer expires is always applied first, and the timer is then restarted
//! or cancelled before it is looked at.  A timeout only fires for the
//! countdown generation that was live when the task went to sleep.
//!
//! # Shutdown
//!
//! [`StationHandle::shutdown`] raises a stop signal and closes the command
//! queue.  A CSMA/CD retry loop in progress gives up at its next collision;
//! the sender task then cancels its timer, discards the window without
//! transmitting and exits.  The receiver task follows once the frame queue
//! closes.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::bits::BitString;
use crate::channel::{Channel, ChannelStats};
use crate::config::LinkConfig;
use crate::csma::{AccessController, AccessOutcome, AccessStats};
use crate::error::LinkError;
use crate::frame::Frame;
use crate::gbn_receiver::{GbnReceiver, ReceiverAction};
use crate::gbn_sender::{GbnSender, SendOutcome, SenderStats};
use crate::state::SenderState;
use crate::timer::RetransmitTimer;

const COMMAND_QUEUE: usize = 64;

/// Reply to [`StationHandle::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted into the window with this sequence number.
    Queued(u64),
    /// Window full; the payload is handed back.
    WindowFull(BitString),
}

/// Point-in-time view of a station's send side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationSnapshot {
    pub base: u64,
    pub next: u64,
    pub state: SenderState,
    pub timer_armed: bool,
    pub sender: SenderStats,
    pub access: AccessStats,
    pub channel: ChannelStats,
}

enum Command {
    Submit {
        payload: BitString,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    /// Queue until the window has room.
    Send {
        payload: BitString,
        reply: oneshot::Sender<u64>,
    },
    /// Resolve once nothing is waiting or in flight.
    Flush(oneshot::Sender<()>),
    Ack(u64),
    Timeout,
    Snapshot(oneshot::Sender<StationSnapshot>),
}

// ---------------------------------------------------------------------------
// Station
// ---------------------------------------------------------------------------

/// One sender/receiver pair over its own channel, ready to be started.
pub struct Station {
    sender: GbnSender,
    controller: AccessController,
    channel: Box<dyn Channel>,
    timer: RetransmitTimer,
    reack: bool,
}

impl Station {
    pub fn new<C>(config: &LinkConfig, channel: C) -> Result<Self, LinkError>
    where
        C: Channel + 'static,
    {
        config.validate()?;
        Ok(Self {
            sender: GbnSender::new(config.initial_seq, config.window_size, config.code.clone())?,
            controller: AccessController::new(config.access),
            channel: Box::new(channel),
            timer: RetransmitTimer::new(config.timer),
            reack: config.reack,
        })
    }

    /// Spawn the sender and receiver tasks and return a handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run(self) -> StationHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut receiver = GbnReceiver::with_delivery(
            self.sender.base(),
            self.sender.code().clone(),
            move |payload| {
                let _ = delivery_tx.send(payload);
            },
        );
        receiver.set_reack(self.reack);
        let receiver_task = tokio::spawn(receiver_loop(receiver, frame_rx, ack_tx));

        let task = SenderTask {
            sender: self.sender,
            controller: self.controller,
            channel: self.channel,
            timer: self.timer,
            frame_tx,
            stop: stop_rx,
            waiting: VecDeque::new(),
            flushes: Vec::new(),
        };
        let sender_task = tokio::spawn(task.run(command_rx, ack_rx));

        StationHandle {
            commands: command_tx,
            stop: stop_tx,
            deliveries: delivery_rx,
            sender_task,
            receiver_task,
        }
    }
}

// ---------------------------------------------------------------------------
// StationHandle
// ---------------------------------------------------------------------------

/// Handle returned by [`Station::run`].
pub struct StationHandle {
    commands: mpsc::Sender<Command>,
    stop: watch::Sender<bool>,
    deliveries: mpsc::UnboundedReceiver<BitString>,
    sender_task: JoinHandle<()>,
    receiver_task: JoinHandle<()>,
}

impl StationHandle {
    /// Offer a payload to the window without waiting.
    pub async fn submit(&self, payload: BitString) -> Result<SubmitOutcome, LinkError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Submit { payload, reply }).await?;
        rx.await.map_err(|_| LinkError::SessionClosed)
    }

    /// [`submit`](Self::submit) for ASCII bit text.
    pub async fn submit_str(&self, payload: &str) -> Result<SubmitOutcome, LinkError> {
        let payload: BitString = payload.parse()?;
        self.submit(payload).await
    }

    /// Queue a payload, waiting for window space; returns its sequence number.
    pub async fn send(&self, payload: BitString) -> Result<u64, LinkError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send { payload, reply }).await?;
        rx.await.map_err(|_| LinkError::SessionClosed)
    }

    /// Wait until every queued payload has been acknowledged.
    pub async fn flush(&self) -> Result<(), LinkError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Flush(reply)).await?;
        rx.await.map_err(|_| LinkError::SessionClosed)
    }

    /// Next payload accepted in order by the receiver (`on_delivery`).
    ///
    /// Accepted payloads queue up, without limit, until they are received
    /// here; a caller that never drains them keeps every payload in memory.
    /// Returns `None` once the station has shut down and the queue is empty.
    pub async fn recv(&mut self) -> Option<BitString> {
        self.deliveries.recv().await
    }

    /// Inject a cumulative ACK as if it came from the receiver.
    pub async fn notify_ack(&self, seq: u64) -> Result<(), LinkError> {
        self.command(Command::Ack(seq)).await
    }

    /// Fire the retransmit timeout now.
    pub async fn notify_timeout(&self) -> Result<(), LinkError> {
        self.command(Command::Timeout).await
    }

    pub async fn snapshot(&self) -> Result<StationSnapshot, LinkError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Snapshot(reply)).await?;
        rx.await.map_err(|_| LinkError::SessionClosed)
    }

    /// Tear the station down mid-window: a pending access attempt is
    /// abandoned, the timer is cancelled and in-flight frames are discarded.
    /// Waits for both tasks to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        drop(self.commands);
        let _ = self.sender_task.await;
        let _ = self.receiver_task.await;
    }

    async fn command(&self, command: Command) -> Result<(), LinkError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| LinkError::SessionClosed)
    }
}

// ---------------------------------------------------------------------------
// Sender task
// ---------------------------------------------------------------------------

struct SenderTask {
    sender: GbnSender,
    controller: AccessController,
    channel: Box<dyn Channel>,
    timer: RetransmitTimer,
    frame_tx: mpsc::UnboundedSender<Frame>,
    stop: watch::Receiver<bool>,
    /// `send` calls parked until the window opens.
    waiting: VecDeque<(BitString, oneshot::Sender<u64>)>,
    flushes: Vec<oneshot::Sender<()>>,
}

impl SenderTask {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut acks: mpsc::UnboundedReceiver<u64>,
    ) {
        // A disarmed timer sleeps until the far future; the `is_armed` guard
        // keeps select! from acting on it.
        let far_future = Duration::from_secs(365 * 24 * 3600);
        let sleep = tokio::time::sleep(far_future);
        tokio::pin!(sleep);

        loop {
            let deadline = self.timer.deadline().unwrap_or_else(|| Instant::now() + far_future);
            sleep.as_mut().reset(deadline);
            let generation = self.timer.generation();

            tokio::select! {
                biased;

                Some(ack) = acks.recv() => self.on_ack(ack),

                command = commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },

                _ = &mut sleep, if self.timer.is_armed() => {
                    if self.timer.is_expired(generation, Instant::now()) {
                        self.on_timeout().await;
                    }
                }
            }

            self.serve_waiting().await;
        }

        self.timer.cancel();
        let discarded = self.sender.teardown();
        self.waiting.clear();
        log::debug!("[station] shut down; discarded {discarded} in-flight frame(s)");
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Submit { payload, reply } => {
                if !self.waiting.is_empty() {
                    let _ = reply.send(SubmitOutcome::WindowFull(payload));
                    return;
                }
                match self.sender.send(payload) {
                    SendOutcome::Queued(frame) => {
                        let _ = reply.send(SubmitOutcome::Queued(frame.seq));
                        self.transmit_new(frame).await;
                    }
                    SendOutcome::WindowFull(payload) => {
                        let _ = reply.send(SubmitOutcome::WindowFull(payload));
                    }
                }
            }
            Command::Send { payload, reply } => self.waiting.push_back((payload, reply)),
            Command::Flush(reply) => self.flushes.push(reply),
            Command::Ack(ack) => self.on_ack(ack),
            Command::Timeout => self.on_timeout().await,
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn on_ack(&mut self, ack: u64) {
        // Stale and premature ACKs are counted and logged by the sender.
        let Ok(released) = self.sender.on_ack(ack) else {
            return;
        };
        if released == 0 {
            return;
        }
        self.timer.reset();
        if self.sender.has_unacked() {
            self.timer.restart(Instant::now());
        } else {
            self.timer.cancel();
        }
    }

    async fn on_timeout(&mut self) {
        let frames = self.sender.on_timeout();
        if frames.is_empty() {
            self.timer.cancel();
            return;
        }
        for frame in frames {
            self.transmit(&frame).await;
        }
        self.timer.back_off();
        self.timer.restart(Instant::now());
    }

    async fn transmit_new(&mut self, frame: Frame) {
        self.transmit(&frame).await;
        self.timer.arm(Instant::now());
    }

    async fn transmit(&mut self, frame: &Frame) {
        let channel = &mut self.channel;
        let stop = &self.stop;
        let outcome = self
            .controller
            .attempt_async_until(|| channel.transmit(frame), || stopping(stop))
            .await;
        match outcome {
            AccessOutcome::Sent { event, .. } => {
                log::trace!("[station] seq={} {}", frame.seq, event.label());
                if let Some(arrived) = event.into_frame() {
                    let _ = self.frame_tx.send(arrived);
                }
            }
            AccessOutcome::Aborted { attempts } => {
                log::debug!(
                    "[station] seq={} abandoned after {attempts} collisions; timer will resend",
                    frame.seq
                );
            }
        }
    }

    /// Admit parked `send`s while the window has room, then release flush
    /// waiters if everything is acknowledged.
    async fn serve_waiting(&mut self) {
        while self.sender.can_send() {
            let Some((payload, reply)) = self.waiting.pop_front() else {
                break;
            };
            if let SendOutcome::Queued(frame) = self.sender.send(payload) {
                let _ = reply.send(frame.seq);
                self.transmit_new(frame).await;
            }
        }

        if self.waiting.is_empty() && !self.sender.has_unacked() {
            for reply in self.flushes.drain(..) {
                let _ = reply.send(());
            }
        }
    }

    fn snapshot(&self) -> StationSnapshot {
        StationSnapshot {
            base: self.sender.base(),
            next: self.sender.next_seq(),
            state: self.sender.state(),
            timer_armed: self.timer.is_armed(),
            sender: self.sender.stats(),
            access: self.controller.stats(),
            channel: self.channel.stats(),
        }
    }
}

/// Shutdown was requested, or the handle is gone.
fn stopping(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

// ---------------------------------------------------------------------------
// Receiver task
// ---------------------------------------------------------------------------

async fn receiver_loop(
    mut receiver: GbnReceiver,
    mut frames: mpsc::UnboundedReceiver<Frame>,
    acks: mpsc::UnboundedSender<u64>,
) {
    while let Some(frame) = frames.recv().await {
        match receiver.on_frame(&frame) {
            ReceiverAction::Ack(seq) | ReceiverAction::Drop { reack: Some(seq) } => {
                if acks.send(seq).is_err() {
                    break;
                }
            }
            ReceiverAction::Drop { reack: None } => {}
        }
    }
    log::trace!("[station] receiver stopped at expected={}", receiver.expected());
}
