//! Entry point for `arq-sim`.
//!
//! Parses CLI arguments and runs either the deterministic emulator or the
//! async session.  All protocol work lives in the library; `main.rs` owns
//! only process setup (logging, argument parsing).

use std::time::Duration;

use anyhow::{Context as _, Result};
use arq_sim::emulator::{Emulator, EmulatorConfig};
use arq_sim::session::{LinkConfig, Session};
use arq_sim::{AckPolicy, Message, ProtocolConfig};
use clap::{Args, Parser, Subcommand};

/// Sliding-window ARQ over a lossy, corrupting link.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Log every protocol event (used when RUST_LOG is unset).
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run the deterministic discrete-event emulator and print its report.
    Simulate {
        #[command(flatten)]
        protocol: ProtocolArgs,
        /// Messages the application generates.
        #[arg(long, default_value_t = 100)]
        messages: usize,
        /// Packet loss probability.
        #[arg(long, default_value_t = 0.0)]
        loss: f64,
        /// Packet corruption probability.
        #[arg(long, default_value_t = 0.0)]
        corrupt: f64,
        /// Mean time between application messages.
        #[arg(long, default_value_t = 20.0)]
        interval: f64,
        #[arg(long, default_value_t = 1234)]
        seed: u64,
        /// Stop after this much simulated time.
        #[arg(long, default_value_t = 3_600_000.0)]
        max_time: f64,
    },
    /// Run sender and receiver as tokio tasks over an in-process link.
    Session {
        #[command(flatten)]
        protocol: ProtocolArgs,
        #[arg(long, default_value_t = 100)]
        messages: usize,
        #[arg(long, default_value_t = 0.0)]
        loss: f64,
        #[arg(long, default_value_t = 0.0)]
        corrupt: f64,
        /// One-way link latency in milliseconds.
        #[arg(long, default_value_t = 5)]
        latency_ms: u64,
        #[arg(long, default_value_t = 1234)]
        seed: u64,
    },
}

/// Flags shared by both modes.  Window and sequence-space sizes default to
/// the preset of the chosen policy.
#[derive(Args, Debug, Clone)]
struct ProtocolArgs {
    #[arg(long, value_enum, default_value_t = AckPolicy::Selective)]
    policy: AckPolicy,
    /// Window size.
    #[arg(long)]
    window: Option<usize>,
    /// Number of distinct sequence numbers.
    #[arg(long)]
    seq_space: Option<u32>,
    /// Retransmission timeout (milliseconds / time units).
    #[arg(long, default_value_t = 16)]
    rto: u64,
}

impl ProtocolArgs {
    fn to_config(&self) -> ProtocolConfig {
        let preset = match self.policy {
            AckPolicy::Selective => ProtocolConfig::selective_repeat(),
            AckPolicy::Cumulative => ProtocolConfig::go_back_n(),
        };
        ProtocolConfig {
            window_size: self.window.unwrap_or(preset.window_size),
            seq_space_size: self.seq_space.unwrap_or(preset.seq_space_size),
            rto: Duration::from_millis(self.rto),
            policy: self.policy,
        }
    }
}

/// Time units on the command line are milliseconds.
fn millis(value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value / 1000.0)
        .with_context(|| format!("invalid duration: {value}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; --trace only changes the default.
    let default_level = if cli.trace { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.mode {
        Mode::Simulate {
            protocol,
            messages,
            loss,
            corrupt,
            interval,
            seed,
            max_time,
        } => {
            let config = protocol.to_config();
            let emulator_config = EmulatorConfig {
                messages,
                loss_prob: loss,
                corrupt_prob: corrupt,
                mean_interval: millis(interval)?,
                seed,
                max_time: millis(max_time)?,
            };
            log::info!(
                "simulating {} messages, policy={} W={} N={}",
                messages,
                config.policy,
                config.window_size,
                config.seq_space_size
            );
            let report = Emulator::new(&config, emulator_config)
                .context("invalid simulation parameters")?
                .run();
            println!("{report}");
        }
        Mode::Session {
            protocol,
            messages,
            loss,
            corrupt,
            latency_ms,
            seed,
        } => {
            let link = LinkConfig {
                loss_prob: loss,
                corrupt_prob: corrupt,
                latency: Duration::from_millis(latency_ms),
                seed,
            };
            run_session(protocol.to_config(), link, messages).await?;
        }
    }

    Ok(())
}

/// Submit `messages` messages, backing off while the window is full, then
/// close and check what came out the other end.
async fn run_session(config: ProtocolConfig, link: LinkConfig, messages: usize) -> Result<()> {
    log::info!(
        "session with {} messages, policy={} W={} N={}",
        messages,
        config.policy,
        config.window_size,
        config.seq_space_size
    );
    let session = Session::spawn(&config, link).context("invalid session parameters")?;
    let backoff = config.rto / 4;

    let mut submitted = Vec::with_capacity(messages);
    for i in 0..messages {
        let message = Message::filled(b'a' + (i % 26) as u8);
        while !session.submit(message).await.context("submit failed")? {
            tokio::time::sleep(backoff).await;
        }
        submitted.push(message);
    }

    let stats = session.close().await.context("session shutdown failed")?;
    println!("{stats}");
    println!(
        "In-order exactly-once delivery: {}",
        if stats.unread == submitted { "yes" } else { "NO" }
    );
    Ok(())
}
