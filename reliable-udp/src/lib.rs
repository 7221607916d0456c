//! `reliable-udp` — a reliable, ordered byte stream over lossy datagrams.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  DATA fragments  ┌──────────┐
//!  │  Sender  │─────────────────▶│ Receiver │
//!  └────┬─────┘                  └─────┬────┘
//!       │                              │
//!       │        ACK (same id)         │
//!       │◀─────────────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────┐
//!  │          ReliableChannel          │
//!  │ (stop-and-wait loop + transport)  │
//!  └────┬──────────────────────────────┘
//!       │ opaque frames
//!  ┌────▼──────────────┐
//!  │ Datagram (trait)  │  UDP socket · in-memory pair · loss injector
//!  └───────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]     — wire format (serialise / deserialise)
//! - [`channel`]    — the send/ack/retransmit and receive/dedup/ack loops
//! - [`sender`]     — fragmentation, id assignment, in-flight fragment
//! - [`receiver`]   — duplicate suppression and reassembly buffer
//! - [`retry`]      — bounded wait, backoff and retry ceiling
//! - [`state`]      — observable channel phases
//! - [`transport`]  — the datagram capability and an in-memory pair
//! - [`socket`]     — UDP implementation of the capability
//! - [`simulator`]  — loss/duplication injection for testing
//! - [`config`]     — per-channel configuration
//! - [`event_log`]  — optional per-channel protocol event file
//! - [`error`]      — errors surfaced to callers

pub mod channel;
pub mod config;
pub mod error;
pub mod event_log;
pub mod packet;
pub mod receiver;
pub mod retry;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod transport;

pub use channel::{ChannelStats, Discard, ReliableChannel, Received};
pub use config::ChannelConfig;
pub use error::ChannelError;
pub use packet::{Packet, PacketError, PacketKind, HEADER_LEN};
pub use retry::RetryPolicy;
pub use simulator::{LossConfig, LossyTransport};
pub use socket::UdpTransport;
pub use transport::{Datagram, Incoming, MemoryTransport};
