//! Entry point for `data-link`.
//!
//! Parses CLI arguments and dispatches to one demo per mechanism.  All
//! protocol work is delegated to library modules; `main.rs` owns only process
//! setup (logging, argument parsing) and printing.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use data_link::channel::{Channel, ChannelConfig, SimulatedChannel};
use data_link::config::DEFAULT_CRC_KEY;
use data_link::csma::{AccessConfig, AccessController, AccessOutcome};
use data_link::{BitString, ErrorCode, Frame, LinkConfig, Simulation, Station};

/// CRC framing, Go-Back-N ARQ and CSMA/CD over a simulated lossy channel.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Encode a payload with a CRC key and verify the codeword.
    Crc {
        /// Payload bits, e.g. 1010101.
        #[arg(short, long)]
        data: String,
        /// Generator key bits.
        #[arg(short, long, default_value = DEFAULT_CRC_KEY)]
        key: String,
        /// Flip this codeword bit before verifying.
        #[arg(long)]
        flip: Option<usize>,
    },
    /// Append an even-parity bit to a payload.
    Parity {
        #[arg(short, long)]
        data: String,
    },
    /// Push frames through CSMA/CD over a colliding channel.
    Csma {
        #[arg(short, long, default_value_t = 5)]
        frames: u64,
        #[arg(long, default_value_t = 0.10)]
        collision_rate: f64,
        /// Retries after the first attempt; omit to retry forever.
        #[arg(long)]
        max_retries: Option<u32>,
        #[arg(short, long, default_value_t = 1)]
        seed: u64,
    },
    /// Deterministic Go-Back-N transfer over a lossy channel.
    Gbn {
        #[arg(short, long, default_value_t = 5)]
        frames: usize,
        #[arg(short, long, default_value_t = 3)]
        window: usize,
        #[arg(long, default_value_t = 0.5)]
        loss_rate: f64,
        #[arg(long, default_value_t = 0.0)]
        corruption_rate: f64,
        /// Number the first frame with this value.
        #[arg(long, default_value_t = 1)]
        first_seq: u64,
        #[arg(short, long, default_value_t = 1)]
        seed: u64,
    },
    /// Several independent async stations transferring concurrently.
    Stations {
        #[arg(short, long, default_value_t = 3)]
        count: u64,
        #[arg(short, long, default_value_t = 10)]
        frames: usize,
        #[arg(short, long, default_value_t = 4)]
        window: usize,
        #[arg(long, default_value_t = 0.3)]
        loss_rate: f64,
        #[arg(short, long, default_value_t = 1)]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Crc { data, key, flip } => run_crc(&data, &key, flip),
        Mode::Parity { data } => run_parity(&data),
        Mode::Csma {
            frames,
            collision_rate,
            max_retries,
            seed,
        } => run_csma(frames, collision_rate, max_retries, seed),
        Mode::Gbn {
            frames,
            window,
            loss_rate,
            corruption_rate,
            first_seq,
            seed,
        } => {
            let channel = ChannelConfig {
                loss_rate,
                corruption_rate,
                ..ChannelConfig::perfect()
            };
            run_gbn(frames, window, channel, first_seq, seed)
        }
        Mode::Stations {
            count,
            frames,
            window,
            loss_rate,
            seed,
        } => run_stations(count, frames, window, loss_rate, seed).await,
    }
}

fn run_crc(data: &str, key: &str, flip: Option<usize>) -> Result<()> {
    let code = ErrorCode::crc(key)?;
    let codeword: BitString = code.encode_str(data)?.parse()?;
    println!("Data with CRC: {codeword}");

    let received = match flip {
        Some(bit) if bit >= codeword.len() => {
            bail!("bit {bit} is outside the {}-bit codeword", codeword.len())
        }
        Some(bit) => {
            let damaged = codeword.flipped(bit);
            println!("Flipped bit {bit}: {damaged}");
            damaged
        }
        None => codeword,
    };
    println!("CRC verification: {}", code.verify(&received));
    Ok(())
}

fn run_parity(data: &str) -> Result<()> {
    let codeword = ErrorCode::Parity.encode_str(data)?;
    println!("Data with parity: {codeword}");
    Ok(())
}

fn run_csma(frames: u64, collision_rate: f64, max_retries: Option<u32>, seed: u64) -> Result<()> {
    let config = ChannelConfig {
        collision_rate,
        ..ChannelConfig::perfect()
    };
    let mut channel = SimulatedChannel::seeded(config, seed)?;
    let mut controller = AccessController::new(AccessConfig {
        max_retries,
        seed,
        ..AccessConfig::default()
    });
    let code = ErrorCode::crc(DEFAULT_CRC_KEY)?;

    for seq in 0..frames {
        let frame = Frame::new(seq, "1010101".parse()?, &code);
        match controller.attempt(|| channel.transmit(&frame)) {
            AccessOutcome::Sent { attempts, .. } => {
                println!("Frame {seq}: data sent successfully after {attempts} attempt(s).")
            }
            AccessOutcome::Aborted { attempts } => {
                println!("Frame {seq}: aborted after {attempts} colliding attempts.")
            }
        }
    }
    let stats = controller.stats();
    println!(
        "Collisions: {}, attempts: {}, aborted: {}",
        stats.collisions, stats.attempts, stats.aborted
    );
    Ok(())
}

fn run_gbn(
    frames: usize,
    window: usize,
    channel: ChannelConfig,
    first_seq: u64,
    seed: u64,
) -> Result<()> {
    let config = LinkConfig {
        window_size: window,
        initial_seq: first_seq,
        ..LinkConfig::default()
    };
    let channel = SimulatedChannel::seeded(channel, seed)?;
    let mut sim = Simulation::new(&config, channel)?;

    let payloads = (0..frames).map(|i| to_bits(i as u64 + first_seq, 8));
    let report = sim.run(payloads).context("transfer did not complete")?;

    let trace: Vec<String> = report.trace.iter().map(u64::to_string).collect();
    println!("Transmission order: {}", trace.join(" "));
    println!("Timeouts: {}", report.timeouts);
    if report.access_aborts > 0 {
        println!("Abandoned by CSMA/CD: {}", report.access_aborts);
    }
    println!(
        "Total number of frames which were sent and resent are: {}",
        report.total_transmissions
    );
    Ok(())
}

async fn run_stations(
    count: u64,
    frames: usize,
    window: usize,
    loss_rate: f64,
    seed: u64,
) -> Result<()> {
    let config = LinkConfig {
        window_size: window,
        ..LinkConfig::default()
    };
    let channel = ChannelConfig {
        loss_rate,
        ..ChannelConfig::perfect()
    };

    let mut tasks = Vec::new();
    for id in 0..count {
        let station = Station::new(&config, SimulatedChannel::seeded(channel, seed + id)?)?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed ^ id);
        let payloads: Vec<BitString> = (0..frames)
            .map(|_| to_bits(rng.random::<u16>() as u64, 16))
            .collect();

        tasks.push(tokio::spawn(async move {
            let mut handle = station.run();
            for payload in &payloads {
                handle.send(payload.clone()).await?;
            }
            handle.flush().await?;

            let mut delivered = Vec::with_capacity(payloads.len());
            while delivered.len() < payloads.len() {
                match handle.recv().await {
                    Some(p) => delivered.push(p),
                    None => break,
                }
            }
            let snapshot = handle.snapshot().await?;
            handle.shutdown().await;
            anyhow::Ok((id, delivered == payloads, snapshot))
        }));
    }

    for task in tasks {
        let (id, intact, snapshot) = task.await??;
        println!(
            "Station {id}: in-order delivery {}, {} transmissions ({} resent), {} timeouts",
            if intact { "ok" } else { "FAILED" },
            snapshot.sender.total_transmissions(),
            snapshot.sender.retransmissions,
            snapshot.sender.timeouts
        );
    }
    Ok(())
}

/// `value` as a `width`-bit big-endian bit string.
fn to_bits(value: u64, width: usize) -> BitString {
    (0..width)
        .rev()
        .map(|i| value >> i & 1 == 1)
        .collect::<Vec<bool>>()
        .into()
}
