//! The reliable channel: stop-and-wait delivery over a lossy transport.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  send(buf) / recv(n)
//!      ▼
//!  ReliableChannel<T: Datagram>
//!    ├── Sender           (next_id, single in-flight fragment)
//!    ├── RetransmitTimer  (bounded wait, backoff, ceiling)
//!    ├── Receiver         (delivered_ids, reassembly buffer)
//!    └── T                (UDP socket, in-memory pair, loss injector)
//! ```
//!
//! `send` fragments the buffer and, for each fragment, transmits a DATA
//! packet and waits for the matching ACK, retransmitting the same bytes on
//! every bounded wait that ends without it.  `recv` acknowledges every DATA
//! packet it sees, appends only fragments it has not delivered before, and
//! returns once the requested number of bytes is available.
//!
//! Id spaces are per direction and the kind tag tells them apart, so one
//! channel can both send and receive over the same transport.  While `send`
//! waits for an ACK, inbound DATA is handed to the receive half (acked,
//! deduplicated, buffered for a later `recv`) instead of being dropped.
//! Without that, a peer whose final ACK was lost and who has already started
//! replying would never get its reply acknowledged.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::event_log::{Event, EventLog};
use crate::packet::{Packet, PacketKind};
use crate::receiver::Receiver;
use crate::retry::{RetransmitTimer, TimeoutOutcome};
use crate::sender::{fragment, RetransmitEntry, Sender};
use crate::state::ChannelState;
use crate::transport::{Datagram, Incoming};

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Why an inbound datagram was dropped without delivering anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    /// Too short for a header, or an unknown kind tag.
    Malformed,
    /// An ACK that does not match the in-flight fragment.
    UnexpectedAck { id: u64 },
    /// A DATA fragment that was delivered before.  It was acknowledged again.
    Duplicate { id: u64 },
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => f.write_str("malformed"),
            Self::UnexpectedAck { id } => write!(f, "unexpected_ack id={id}"),
            Self::Duplicate { id } => write!(f, "duplicate id={id}"),
        }
    }
}

/// Outcome of one bounded-wait receive step, see [`ReliableChannel::poll_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A new fragment; its payload was also appended to the reassembly buffer.
    Delivered(Vec<u8>),
    /// A datagram arrived but contributed nothing.
    Discarded(Discard),
    /// The transport reported that the peer is gone.
    Closed,
    /// Nothing arrived within the bounded wait.
    Idle,
}

/// Result of one bounded wait for an ACK.
enum AckWait {
    Acked(RetransmitEntry),
    Missed,
    Closed,
}

/// Protocol counters for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// DATA frames transmitted for the first time.
    pub data_sent: u64,
    /// DATA frames transmitted again after a missed ACK.
    pub retransmissions: u64,
    /// ACKs that matched the in-flight fragment.
    pub acks_received: u64,
    /// ACKs emitted, duplicates included.
    pub acks_sent: u64,
    /// Distinct fragments appended to the reassembly buffer.
    pub fragments_delivered: u64,
    /// Application bytes appended to the reassembly buffer.
    pub bytes_delivered: u64,
    /// Retransmitted DATA that was acknowledged but not re-delivered.
    pub duplicates: u64,
    /// Malformed datagrams and unexpected ACKs.
    pub discarded: u64,
}

// ---------------------------------------------------------------------------
// ReliableChannel
// ---------------------------------------------------------------------------

/// A reliable, ordered byte stream over a [`Datagram`] transport.
pub struct ReliableChannel<T> {
    transport: T,
    config: ChannelConfig,
    state: ChannelState,
    sender: Sender,
    timer: RetransmitTimer,
    receiver: Receiver,
    stats: ChannelStats,
    events: EventLog,
}

impl<T: Datagram> ReliableChannel<T> {
    /// Wrap `transport` in a channel configured by `config`.
    ///
    /// Fails if the config is invalid or its event log cannot be opened.
    pub fn new(transport: T, config: ChannelConfig) -> Result<Self, ChannelError> {
        config.validate()?;
        let events = match &config.event_log {
            Some(path) => EventLog::open(path)?,
            None => EventLog::disabled(),
        };
        Ok(Self {
            transport,
            timer: RetransmitTimer::new(config.retry.clone()),
            config,
            state: ChannelState::Idle,
            sender: Sender::new(),
            receiver: Receiver::new(),
            stats: ChannelStats::default(),
            events,
        })
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Reliably deliver `buf` to the peer.
    ///
    /// Returns the number of application bytes sent once every fragment has
    /// been acknowledged.  With the default [`crate::retry::RetryPolicy`]
    /// this never gives up; with a ceiling it fails with
    /// [`ChannelError::DeliveryFailed`].
    pub async fn send(&mut self, buf: &[u8]) -> Result<usize, ChannelError> {
        if let Some(stale) = self.sender.abandon() {
            log::debug!(
                "[chan] abandoning unacknowledged fragment id={} ({} bytes)",
                stale.id,
                stale.payload_len
            );
        }

        let result = self.send_fragments(buf).await;
        self.state = ChannelState::Idle;
        result
    }

    async fn send_fragments(&mut self, buf: &[u8]) -> Result<usize, ChannelError> {
        let mut sent = 0;
        for chunk in fragment(buf, self.config.max_fragment_payload()) {
            self.send_fragment(chunk).await?;
            sent += chunk.len();
        }
        Ok(sent)
    }

    /// Transmit one fragment and block until it is acknowledged.
    async fn send_fragment(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        let pkt = self.sender.build_data_packet(payload);
        let id = pkt.id;
        let frame = pkt.encode();

        self.transport.send_datagram(&frame).await?;
        self.sender.record_sent(&pkt, frame);
        self.timer.arm();
        self.state = ChannelState::AwaitingAck { id };
        self.stats.data_sent += 1;
        self.events.record(Event::DataSent {
            id,
            len: payload.len(),
        });
        log::debug!("[chan] → DATA id={id} len={}", payload.len());

        loop {
            match self.await_ack().await? {
                AckWait::Acked(entry) => {
                    self.stats.acks_received += 1;
                    self.events.record(Event::AckReceived { id });
                    log::debug!(
                        "[chan] ← ACK id={id} len={} ({} transmission(s), {:?} after the last)",
                        entry.payload_len,
                        entry.tx_count,
                        entry.sent_at.elapsed()
                    );
                    return Ok(());
                }
                AckWait::Closed => {
                    self.sender.abandon();
                    return Err(ChannelError::Closed);
                }
                AckWait::Missed => {}
            }

            match self.timer.on_timeout() {
                TimeoutOutcome::GiveUp => {
                    let attempts = self.timer.attempts();
                    self.sender.abandon();
                    self.events.record(Event::DeliveryFailed { id, attempts });
                    log::warn!("[chan] fragment id={id} unacknowledged after {attempts} attempt(s)");
                    return Err(ChannelError::DeliveryFailed { id, attempts });
                }
                TimeoutOutcome::Retry => {
                    if let Some(frame) = self.sender.on_retransmit() {
                        self.transport.send_datagram(frame).await?;
                    }
                    let attempt = self.timer.attempts();
                    self.stats.retransmissions += 1;
                    self.events.record(Event::Retransmit { id, attempt });
                    log::debug!(
                        "[chan] timeout — retransmitting id={id} (attempt {attempt}, wait {:?})",
                        self.timer.current_wait()
                    );
                }
            }
        }
    }

    /// One bounded receive attempt while a fragment is in flight.
    async fn await_ack(&mut self) -> Result<AckWait, ChannelError> {
        let frame = match self
            .transport
            .recv_datagram(self.timer.current_wait())
            .await?
        {
            Incoming::Datagram(frame) => frame,
            Incoming::NoneArrived => return Ok(AckWait::Missed),
            Incoming::Closed => return Ok(AckWait::Closed),
        };

        let pkt = match Packet::decode(&frame) {
            Ok(pkt) => pkt,
            Err(e) => {
                self.discard(Discard::Malformed);
                log::debug!("[chan] ← malformed datagram while awaiting ACK: {e}");
                return Ok(AckWait::Missed);
            }
        };

        match pkt.kind {
            PacketKind::Ack => match self.sender.on_ack(pkt.id) {
                Some(entry) => Ok(AckWait::Acked(entry)),
                None => {
                    self.discard(Discard::UnexpectedAck { id: pkt.id });
                    log::debug!("[chan] ← stale ACK id={}", pkt.id);
                    Ok(AckWait::Missed)
                }
            },
            PacketKind::Data => {
                self.accept_data(pkt).await?;
                Ok(AckWait::Missed)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Receiving
    // -----------------------------------------------------------------------

    /// Receive exactly `requested` bytes from the peer.
    ///
    /// Waits as long as it takes; bytes past `requested` stay buffered for
    /// the next call.  `recv(0)` returns at once if anything is buffered and
    /// otherwise waits for one new fragment, which lets a peer's empty
    /// `send` complete.
    pub async fn recv(&mut self, requested: usize) -> Result<Vec<u8>, ChannelError> {
        let result = self.fill(requested).await;
        self.state = ChannelState::Idle;
        result?;
        Ok(self.receiver.read(requested))
    }

    async fn fill(&mut self, requested: usize) -> Result<(), ChannelError> {
        if requested == 0 && self.receiver.buffered() > 0 {
            return Ok(());
        }

        self.state = ChannelState::AwaitingData;
        let mut got_fragment = false;
        while self.receiver.buffered() < requested || (requested == 0 && !got_fragment) {
            match self.poll_data().await? {
                Received::Delivered(_) => got_fragment = true,
                Received::Closed => return Err(ChannelError::Closed),
                Received::Discarded(_) | Received::Idle => {}
            }
        }
        Ok(())
    }

    /// Perform one bounded-wait receive step of the receive loop.
    ///
    /// DATA is always acknowledged; new fragments are appended to the
    /// reassembly buffer (read them with [`recv`](Self::recv)).  Malformed
    /// datagrams and ACKs are discarded.
    pub async fn poll_data(&mut self) -> Result<Received, ChannelError> {
        let frame = match self
            .transport
            .recv_datagram(self.config.retry.ack_timeout)
            .await?
        {
            Incoming::Datagram(frame) => frame,
            Incoming::NoneArrived => return Ok(Received::Idle),
            Incoming::Closed => return Ok(Received::Closed),
        };

        match Packet::decode(&frame) {
            Err(e) => {
                log::debug!("[chan] ← discarding malformed datagram: {e}");
                Ok(self.discard(Discard::Malformed))
            }
            Ok(pkt) if pkt.kind == PacketKind::Ack => {
                log::debug!("[chan] ← unexpected ACK id={}", pkt.id);
                Ok(self.discard(Discard::UnexpectedAck { id: pkt.id }))
            }
            Ok(pkt) => self.accept_data(pkt).await,
        }
    }

    /// Deliver DATA if new, then acknowledge it whether new or not.
    async fn accept_data(&mut self, pkt: Packet) -> Result<Received, ChannelError> {
        let id = pkt.id;
        let payload = pkt.payload.unwrap_or_default();
        let fresh = self.receiver.on_data(id, &payload);
        self.events.record(Event::DataReceived {
            id,
            len: payload.len(),
            duplicate: !fresh,
        });

        self.transport.send_datagram(&Packet::ack(id).encode()).await?;
        self.stats.acks_sent += 1;
        self.events.record(Event::AckSent { id });
        log::debug!(
            "[chan] ← DATA id={id} len={} duplicate={}; → ACK id={id}",
            payload.len(),
            !fresh
        );

        if fresh {
            self.stats.fragments_delivered += 1;
            self.stats.bytes_delivered += payload.len() as u64;
            Ok(Received::Delivered(payload))
        } else {
            self.stats.duplicates += 1;
            Ok(Received::Discarded(Discard::Duplicate { id }))
        }
    }

    /// Keep acknowledging DATA until nothing arrives for `quiet`.
    ///
    /// The ACK for the peer's last fragment can be lost after
    /// [`recv`](Self::recv) has returned; the peer then retransmits that
    /// fragment until someone acknowledges it again.  Call this before
    /// dropping a channel whose peer may still be sending.
    pub async fn linger(&mut self, quiet: Duration) -> Result<(), ChannelError> {
        let mut last_activity = Instant::now();
        while last_activity.elapsed() < quiet {
            match self.poll_data().await? {
                Received::Idle => {}
                Received::Closed => break,
                Received::Delivered(_) | Received::Discarded(_) => {
                    last_activity = Instant::now();
                }
            }
        }
        Ok(())
    }

    fn discard(&mut self, reason: Discard) -> Received {
        self.stats.discarded += 1;
        self.events.record(Event::Discarded { reason });
        Received::Discarded(reason)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Id the next fragment sent will carry.
    pub fn next_id(&self) -> u64 {
        self.sender.next_id()
    }

    /// `true` when the peer's fragment `id` has been delivered.
    pub fn is_delivered(&self, id: u64) -> bool {
        self.receiver.is_delivered(id)
    }

    /// Number of distinct peer fragments delivered so far.
    pub fn delivered_count(&self) -> usize {
        self.receiver.delivered_count()
    }

    /// Delivered bytes not yet returned by [`recv`](Self::recv).
    pub fn buffered(&self) -> usize {
        self.receiver.buffered()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

impl<T> fmt::Debug for ReliableChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReliableChannel")
            .field("state", &self.state)
            .field("next_id", &self.sender.next_id())
            .field("in_flight", &self.sender.has_unacked())
            .field("buffered", &self.receiver.buffered())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
