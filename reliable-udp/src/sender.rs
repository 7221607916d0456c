//! Outbound fragment state for stop-and-wait reliability.
//!
//! [`Sender`] assigns fragment ids and tracks the single in-flight fragment.
//! It does **not** touch the transport; [`crate::channel::ReliableChannel`]
//! calls these methods and owns the actual send/receive loop.
//!
//! # Stop-and-Wait contract
//! - Fragment ids start at 1 and strictly increase for the lifetime of the
//!   sender; they are never reused, not even across `send` calls.
//! - At most **one** fragment is in flight at any moment (`unacked`).
//! - A new fragment may only be sent once `unacked` is `None`.
//! - On the matching ACK: clear `unacked`.
//! - On timeout: increment `tx_count`; resend the same encoded bytes.

use std::time::Instant;

use crate::packet::{Packet, NO_ID};

/// Split `buf` into ordered slices of at most `max_payload` bytes.
///
/// The last slice may be shorter.  An empty buffer yields exactly one empty
/// slice so that an empty send is still acknowledged by the peer.
///
/// # Panics
///
/// Panics if `max_payload` is zero.
pub fn fragment(buf: &[u8], max_payload: usize) -> Vec<&[u8]> {
    assert!(max_payload > 0, "max_payload must be at least 1");
    if buf.is_empty() {
        return vec![buf];
    }
    buf.chunks(max_payload).collect()
}

// ---------------------------------------------------------------------------
// RetransmitEntry
// ---------------------------------------------------------------------------

/// A fragment that has been sent but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransmitEntry {
    /// Fragment id carried by the DATA packet.
    pub id: u64,
    /// The encoded DATA packet, resent byte-for-byte on timeout.
    pub frame: Vec<u8>,
    /// Number of application bytes in this fragment.
    pub payload_len: usize,
    /// How many times this fragment has been transmitted (1 = first send).
    pub tx_count: u32,
    /// Wall-clock time of the most recent transmission.
    pub sent_at: Instant,
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Stop-and-wait send-side state for one channel.
#[derive(Debug)]
pub struct Sender {
    /// Id for the **next** fragment.  Only ever increases.
    next_id: u64,

    /// The in-flight fragment, or `None` when the sender is idle.
    unacked: Option<RetransmitEntry>,
}

impl Default for Sender {
    fn default() -> Self {
        Self::new()
    }
}

impl Sender {
    /// Create a sender whose first fragment will carry id 1.
    pub fn new() -> Self {
        Self {
            next_id: NO_ID + 1,
            unacked: None,
        }
    }

    /// Id the next call to [`build_data_packet`](Self::build_data_packet)
    /// will assign.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Assign the next id to `payload` and wrap it in a DATA packet.
    ///
    /// The id is consumed immediately, so a fragment that is later abandoned
    /// never has its id handed out again.
    pub fn build_data_packet(&mut self, payload: &[u8]) -> Packet {
        let id = self.next_id;
        self.next_id += 1;
        Packet::data(id, payload.to_vec())
    }

    /// Move `packet` into the in-flight slot (first transmission).
    ///
    /// Panics in debug mode if a fragment is already in flight.
    pub fn record_sent(&mut self, packet: &Packet, frame: Vec<u8>) {
        debug_assert!(
            self.unacked.is_none(),
            "record_sent called while fragment {:?} is still in flight",
            self.unacked.as_ref().map(|e| e.id)
        );
        self.unacked = Some(RetransmitEntry {
            id: packet.id,
            frame,
            payload_len: packet.payload_bytes().len(),
            tx_count: 1,
            sent_at: Instant::now(),
        });
    }

    /// Process an inbound ACK id.
    ///
    /// Returns the acknowledged entry if `ack_id` matches the in-flight
    /// fragment, clearing the slot.  Returns `None` for a stale or
    /// unexpected ACK.
    pub fn on_ack(&mut self, ack_id: u64) -> Option<RetransmitEntry> {
        if self.unacked.as_ref().is_some_and(|e| e.id == ack_id) {
            self.unacked.take()
        } else {
            None
        }
    }

    /// Count a retransmission and return the frame to put back on the wire.
    pub fn on_retransmit(&mut self) -> Option<&[u8]> {
        let entry = self.unacked.as_mut()?;
        entry.tx_count += 1;
        entry.sent_at = Instant::now();
        Some(&entry.frame)
    }

    /// Drop the in-flight fragment without an ACK.
    ///
    /// Used when a send is abandoned; the fragment's id stays consumed.
    pub fn abandon(&mut self) -> Option<RetransmitEntry> {
        self.unacked.take()
    }

    /// `true` when a fragment is waiting for an ACK.
    pub fn has_unacked(&self) -> bool {
        self.unacked.is_some()
    }
}
