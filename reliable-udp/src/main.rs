//! Entry point for `reliable-udp`.
//!
//! Parses CLI arguments and dispatches into **send**, **recv** or **demo**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, argument parsing, file I/O).
//!
//! `send` and `recv` exchange one length-prefixed message: an 8-byte
//! big-endian byte count followed by the bytes themselves, so the receiver
//! knows how much to ask the channel for.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::RngCore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use reliable_udp::config::DEFAULT_MAX_FRAME_SIZE;
use reliable_udp::{
    ChannelConfig, ChannelError, LossConfig, LossyTransport, ReliableChannel, RetryPolicy,
    UdpTransport,
};

/// Quiet waits a receiver sits through before it stops acknowledging.
const LINGER_WAITS: u32 = 5;

/// Reliable, ordered byte stream over lossy UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send one message (a file, or stdin) to a peer.
    Send {
        /// Local address to bind (e.g. 0.0.0.0:9001).
        #[arg(short, long, default_value = "0.0.0.0:9001")]
        bind: SocketAddr,
        /// Remote peer address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        peer: SocketAddr,
        /// File to send; stdin when omitted.
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[command(flatten)]
        channel: ChannelArgs,
    },
    /// Receive one message from a peer.
    Recv {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Remote peer address (e.g. 127.0.0.1:9001).
        #[arg(short, long)]
        peer: SocketAddr,
        /// Write the message here; stdout when omitted.
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        channel: ChannelArgs,
    },
    /// Run both ends on loopback and check the round trip.
    Demo {
        /// Size of the random message.
        #[arg(long, default_value_t = 64 * 1024)]
        bytes: usize,
        #[command(flatten)]
        channel: ChannelArgs,
    },
}

/// Channel and loss-injection options shared by every mode.
#[derive(Args, Clone)]
struct ChannelArgs {
    /// Maximum datagram size in bytes, header included.
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    frame_size: usize,
    /// Bounded wait for an ACK before retransmitting, in milliseconds.
    #[arg(long, default_value_t = 200)]
    ack_timeout_ms: u64,
    /// Give up after this many transmissions of one fragment.
    #[arg(long)]
    max_attempts: Option<u32>,
    /// Multiply the wait by this factor after every timeout.
    #[arg(long, default_value_t = 1.0)]
    backoff: f64,
    /// Probability of dropping each outgoing datagram.
    #[arg(long, default_value_t = 0.0)]
    loss: f64,
    /// Seed for the loss injector.
    #[arg(long)]
    seed: Option<u64>,
    /// Append protocol events to this file.
    #[arg(long)]
    event_log: Option<PathBuf>,
}

impl ChannelArgs {
    fn config(&self) -> ChannelConfig {
        let ack_timeout = Duration::from_millis(self.ack_timeout_ms);
        let retry = RetryPolicy {
            ack_timeout,
            max_attempts: self.max_attempts,
            ..RetryPolicy::default()
        }
        .with_backoff(
            self.backoff,
            ack_timeout.saturating_mul(25).max(Duration::from_secs(5)),
        );
        ChannelConfig {
            max_frame_size: self.frame_size,
            retry,
            event_log: self.event_log.clone(),
        }
    }

    /// How long a receiver keeps re-acknowledging after its last read.
    fn linger(&self) -> Duration {
        self.config().retry.longest_wait().saturating_mul(LINGER_WAITS)
    }

    fn loss(&self) -> LossConfig {
        LossConfig {
            loss_rate: self.loss,
            seed: self.seed,
            ..LossConfig::default()
        }
    }

    async fn open(
        &self,
        bind: SocketAddr,
        peer: SocketAddr,
    ) -> Result<ReliableChannel<LossyTransport<UdpTransport>>> {
        let socket = UdpTransport::bind(bind, peer)
            .await
            .with_context(|| format!("binding {bind}"))?;
        let transport = LossyTransport::new(socket, self.loss())?;
        Ok(ReliableChannel::new(transport, self.config())?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Send {
            bind,
            peer,
            file,
            channel,
        } => {
            let data = match &file {
                Some(path) => tokio::fs::read(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    tokio::io::stdin().read_to_end(&mut buf).await?;
                    buf
                }
            };

            let mut chan = channel.open(bind, peer).await?;
            log::info!("Sending {} bytes to {peer}", data.len());
            chan.send(&(data.len() as u64).to_be_bytes()).await?;
            let sent = chan.send(&data).await?;
            log::info!("Delivered {sent} bytes; {:?}", chan.stats());
            println!("{sent}");
        }
        Mode::Recv {
            bind,
            peer,
            out,
            channel,
        } => {
            let mut chan = channel.open(bind, peer).await?;
            log::info!("Waiting for a message from {peer}");
            let header = chan.recv(8).await?;
            let len = u64::from_be_bytes(header.as_slice().try_into()?);
            let len = usize::try_from(len).context("message too large for this platform")?;
            let data = chan.recv(len).await?;
            log::info!("Received {len} bytes; {:?}", chan.stats());
            chan.linger(channel.linger()).await?;

            match &out {
                Some(path) => tokio::fs::write(path, &data)
                    .await
                    .with_context(|| format!("writing {}", path.display()))?,
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&data).await?;
                    stdout.flush().await?;
                }
            }
        }
        Mode::Demo { bytes, channel } => demo(bytes, channel).await?,
    }

    Ok(())
}

/// Send `bytes` random bytes between two loopback channels and verify them.
async fn demo(bytes: usize, args: ChannelArgs) -> Result<()> {
    let loopback: SocketAddr = "127.0.0.1:0".parse()?;

    let mut a = UdpTransport::bind(loopback, loopback).await?;
    let b = UdpTransport::bind(loopback, a.local_addr).await?;
    a.set_peer(b.local_addr);

    // Independent loss streams for the two directions.
    let mut b_loss = args.loss();
    b_loss.seed = b_loss.seed.map(|s| s.wrapping_add(1));
    let mut sender = ReliableChannel::new(LossyTransport::new(a, args.loss())?, args.config())?;
    let receiver_config = ChannelConfig {
        event_log: None,
        ..args.config()
    };
    let mut receiver = ReliableChannel::new(LossyTransport::new(b, b_loss)?, receiver_config)?;

    let mut message = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut message);

    let linger = args.linger();
    let started = Instant::now();
    let rx = tokio::spawn(async move {
        let data = receiver.recv(bytes).await?;
        receiver.linger(linger).await?;
        Ok::<_, ChannelError>((data, receiver))
    });
    let sent = sender.send(&message).await?;
    let elapsed = started.elapsed();
    let (data, receiver) = rx.await??;

    if data != message {
        bail!("round trip corrupted the message");
    }
    println!(
        "delivered {sent} bytes in {elapsed:?} ({} retransmissions, {} frames dropped, {} duplicates suppressed)",
        sender.stats().retransmissions,
        sender.transport().dropped() + receiver.transport().dropped(),
        receiver.stats().duplicates,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> ChannelArgs {
        let argv = ["reliable-udp", "demo"].iter().chain(extra);
        match Cli::try_parse_from(argv).unwrap().mode {
            Mode::Demo { channel, .. } => channel,
            _ => unreachable!(),
        }
    }

    #[test]
    fn defaults_build_a_valid_config() {
        let args = args(&[]);
        assert!(args.config().validate().is_ok());
        assert_eq!(args.linger(), Duration::from_millis(200) * LINGER_WAITS);
    }

    #[test]
    fn extreme_timeouts_do_not_overflow() {
        let args = args(&[
            "--ack-timeout-ms",
            &u64::MAX.to_string(),
            "--backoff",
            "1e30",
        ]);
        let config = args.config();
        assert!(config.retry.max_wait >= config.retry.ack_timeout);
        assert!(args.linger() >= config.retry.max_wait);
    }
}
