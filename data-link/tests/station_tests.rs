//! Integration tests for async stations.
//!
//! Most tests run on a paused tokio clock: retransmit timers fire as soon as
//! the runtime has nothing else to do, so lossy transfers finish instantly and
//! deterministically.  The starvation test keeps a real clock so its
//! deadlines measure actual progress.

use std::time::Duration;

use data_link::channel::{ChannelConfig, Fault, ScriptedChannel, SimulatedChannel};
use data_link::error::{CodeError, LinkError};
use data_link::state::SenderState;
use data_link::{AccessConfig, BitString, LinkConfig, Station, StationHandle, SubmitOutcome};

fn payloads(n: usize, tag: u8) -> Vec<BitString> {
    (0..n)
        .map(|i| format!("{tag:04b}{:08b}", i).parse().unwrap())
        .collect()
}

/// A channel that drops the first `n` frames and delivers the rest.
fn lose_first(n: usize) -> ScriptedChannel {
    ScriptedChannel::new(std::iter::repeat(Fault::Lose).take(n))
}

/// Send everything, wait for the ACKs, then collect the deliveries.
async fn transfer(handle: &mut StationHandle, data: &[BitString]) -> Vec<BitString> {
    for payload in data {
        handle.send(payload.clone()).await.expect("send");
    }
    handle.flush().await.expect("flush");

    let mut delivered = Vec::new();
    while delivered.len() < data.len() {
        delivered.push(handle.recv().await.expect("delivery"));
    }
    delivered
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_reliable_channel_delivers_in_order() {
    let station = Station::new(&LinkConfig::default(), ScriptedChannel::reliable()).unwrap();
    let mut handle = station.run();

    let data = payloads(8, 1);
    assert_eq!(transfer(&mut handle, &data).await, data);

    let snap = handle.snapshot().await.unwrap();
    assert_eq!((snap.base, snap.next), (8, 8));
    assert_eq!(snap.state, SenderState::Idle);
    assert!(!snap.timer_armed);
    assert_eq!(snap.sender.retransmissions, 0);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_half_loss_channel_still_delivers_everything() {
    let channel = SimulatedChannel::seeded(ChannelConfig::arq_default(), 7).unwrap();
    let station = Station::new(&LinkConfig::default(), channel).unwrap();
    let mut handle = station.run();

    let data = payloads(20, 2);
    assert_eq!(transfer(&mut handle, &data).await, data);

    let snap = handle.snapshot().await.unwrap();
    assert!(snap.sender.timeouts > 0, "50% loss must trigger timeouts");
    assert_eq!(snap.sender.acked, 20);
    assert_eq!(
        snap.channel.transmissions,
        snap.sender.total_transmissions()
    );
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_stations_are_independent() {
    let mut tasks = Vec::new();
    for id in 0..4u8 {
        tasks.push(tokio::spawn(async move {
            let config = LinkConfig {
                window_size: 2 + id as usize,
                ..LinkConfig::default()
            };
            let channel = SimulatedChannel::seeded(ChannelConfig::arq_default(), id as u64).unwrap();
            let mut handle = Station::new(&config, channel).unwrap().run();

            let data = payloads(12, id);
            let delivered = transfer(&mut handle, &data).await;
            handle.shutdown().await;
            (data, delivered)
        }));
    }

    for task in tasks {
        let (sent, delivered) = task.await.unwrap();
        assert_eq!(sent, delivered);
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_jammed_station_does_not_starve_its_neighbour() {
    let unbounded = LinkConfig {
        access: AccessConfig {
            max_retries: None,
            ..AccessConfig::default()
        },
        ..LinkConfig::default()
    };
    let jam = ChannelConfig {
        collision_rate: 1.0,
        ..ChannelConfig::perfect()
    };
    let jammed = Station::new(&unbounded, SimulatedChannel::seeded(jam, 1).unwrap())
        .unwrap()
        .run();
    assert_eq!(
        jammed.submit_str("1").await.unwrap(),
        SubmitOutcome::Queued(0)
    );

    let mut healthy = Station::new(&LinkConfig::default(), ScriptedChannel::reliable())
        .unwrap()
        .run();
    let data = payloads(5, 5);
    let delivered = tokio::time::timeout(Duration::from_secs(5), transfer(&mut healthy, &data))
        .await
        .expect("healthy station made no progress");
    assert_eq!(delivered, data);
    healthy.shutdown().await;

    // Shutdown interrupts the endless collision loop.
    tokio::time::timeout(Duration::from_secs(5), jammed.shutdown())
        .await
        .expect("jammed station ignored shutdown");
}

#[tokio::test(start_paused = true)]
async fn test_deliveries_wait_in_queue_until_received() {
    let mut handle = Station::new(&LinkConfig::default(), ScriptedChannel::reliable())
        .unwrap()
        .run();
    let data = payloads(9, 6);
    for payload in &data {
        handle.send(payload.clone()).await.unwrap();
    }
    handle.flush().await.unwrap();

    // Nothing was received while sending; everything is still queued.
    for payload in &data {
        assert_eq!(handle.recv().await.as_ref(), Some(payload));
    }
    handle.shutdown().await;
}

// ---------------------------------------------------------------------------
// Window limits
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_submit_reports_full_window() {
    let station = Station::new(&LinkConfig::default(), lose_first(3)).unwrap();
    let handle = station.run();

    for seq in 0..3 {
        assert_eq!(
            handle.submit_str("1011").await.unwrap(),
            SubmitOutcome::Queued(seq)
        );
    }
    let refused: BitString = "111".parse().unwrap();
    assert_eq!(
        handle.submit(refused.clone()).await.unwrap(),
        SubmitOutcome::WindowFull(refused)
    );

    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.state, SenderState::WindowFull);
    assert_eq!(snap.next - snap.base, 3);
    assert!(snap.timer_armed);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_submit_rejects_malformed_payload() {
    let handle = Station::new(&LinkConfig::default(), ScriptedChannel::reliable())
        .unwrap()
        .run();
    let err = handle.submit_str("10x1").await.unwrap_err();
    assert_eq!(
        err,
        LinkError::Code(CodeError::MalformedInput {
            position: 2,
            found: 'x'
        })
    );
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_send_waits_for_window_room() {
    let config = LinkConfig {
        window_size: 2,
        ..LinkConfig::default()
    };
    let mut handle = Station::new(&config, lose_first(2)).unwrap().run();

    let data = payloads(6, 3);
    assert_eq!(transfer(&mut handle, &data).await, data);

    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.next, 6);
    assert!(snap.sender.timeouts >= 1);
    handle.shutdown().await;
}

// ---------------------------------------------------------------------------
// Externally driven events
// ---------------------------------------------------------------------------

fn slow_timer() -> LinkConfig {
    let mut config = LinkConfig::default();
    config.timer.initial_rto = Duration::from_secs(60);
    config.timer.max_rto = Duration::from_secs(60);
    config
}

#[tokio::test(start_paused = true)]
async fn test_notify_ack_slides_window_and_counts_invalid_acks() {
    let handle = Station::new(&slow_timer(), lose_first(3)).unwrap().run();
    for _ in 0..3 {
        handle.submit_str("0110").await.unwrap();
    }

    handle.notify_ack(0).await.unwrap();
    let snap = handle.snapshot().await.unwrap();
    assert_eq!((snap.base, snap.next), (1, 3));
    assert_eq!(snap.state, SenderState::WindowOpen);
    assert!(snap.timer_armed);

    // Beyond the window, then already acknowledged.
    handle.notify_ack(7).await.unwrap();
    handle.notify_ack(0).await.unwrap();
    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.base, 1);
    assert_eq!(snap.sender.invalid_acks, 2);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_notify_timeout_resends_whole_window() {
    let mut handle = Station::new(&slow_timer(), lose_first(3)).unwrap().run();
    let data = payloads(3, 4);
    for payload in &data {
        handle.submit(payload.clone()).await.unwrap();
    }

    handle.notify_timeout().await.unwrap();
    handle.flush().await.unwrap();

    for payload in &data {
        assert_eq!(handle.recv().await.as_ref(), Some(payload));
    }
    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.sender.timeouts, 1);
    assert_eq!(snap.sender.retransmissions, 3);
    assert_eq!(snap.channel.transmissions, 6);
    assert_eq!(snap.state, SenderState::Idle);
    assert!(!snap.timer_armed);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_ack_ready_at_the_deadline_beats_the_timer() {
    let config = LinkConfig::default();
    let rto = config.timer.initial_rto;
    let handle = Station::new(&config, lose_first(2)).unwrap().run();
    handle.submit_str("1101").await.unwrap();
    handle.submit_str("0010").await.unwrap();

    // The ACK is queued before the clock reaches the deadline; both are
    // ready when the sender task next runs.
    handle.notify_ack(0).await.unwrap();
    tokio::time::advance(rto).await;

    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.sender.timeouts, 0);
    assert_eq!(snap.sender.retransmissions, 0);
    assert_eq!((snap.base, snap.next), (1, 2));
    // Frame 1 is still outstanding, so the countdown was restarted.
    assert!(snap.timer_armed);
    assert_eq!(snap.state, SenderState::WindowOpen);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_final_ack_at_the_deadline_cancels_the_timer() {
    let config = LinkConfig::default();
    let rto = config.timer.initial_rto;
    let handle = Station::new(&config, lose_first(1)).unwrap().run();
    handle.submit_str("1").await.unwrap();

    handle.notify_ack(0).await.unwrap();
    tokio::time::advance(rto).await;

    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.sender.timeouts, 0);
    assert_eq!(snap.sender.retransmissions, 0);
    assert!(!snap.timer_armed);
    assert_eq!(snap.state, SenderState::Idle);

    // The stale countdown never fires later either.
    tokio::time::sleep(rto * 10).await;
    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.sender.timeouts, 0);
    assert_eq!(snap.channel.transmissions, 1);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_timeout_with_empty_window_is_ignored() {
    let handle = Station::new(&LinkConfig::default(), ScriptedChannel::reliable())
        .unwrap()
        .run();
    handle.notify_timeout().await.unwrap();
    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.sender.timeouts, 0);
    assert_eq!(snap.channel.transmissions, 0);
    handle.shutdown().await;
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_shutdown_mid_window_discards_in_flight_frames() {
    let handle = Station::new(&slow_timer(), lose_first(8)).unwrap().run();
    handle.submit_str("1").await.unwrap();
    handle.submit_str("0").await.unwrap();

    let snap = handle.snapshot().await.unwrap();
    assert_eq!(snap.next - snap.base, 2);
    assert_eq!(snap.channel.transmissions, 2);

    // Returns without waiting for the 60 s timer or any retransmission.
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_is_rejected() {
    let config = LinkConfig {
        window_size: 0,
        ..LinkConfig::default()
    };
    assert!(matches!(
        Station::new(&config, ScriptedChannel::reliable()),
        Err(LinkError::InvalidConfig(_))
    ));
}
