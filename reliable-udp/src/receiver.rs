//! Inbound fragment deduplication and reassembly.
//!
//! The [`Receiver`] is responsible for everything that happens *after* a raw
//! datagram is decoded into a DATA [`crate::packet::Packet`] and *before*
//! the application reads bytes:
//! - Recording which fragment ids have already been delivered.
//! - Appending the payload of each new fragment to the application buffer.
//! - Ignoring the payload of retransmitted duplicates.
//!
//! Because the peer never sends fragment `k + 1` before fragment `k` is
//! acknowledged, fragments always arrive in order and no resequencing is
//! needed here.
//!
//! The [`Receiver`] does **not** send ACKs itself.  Every DATA packet,
//! duplicate or not, must be acknowledged by
//! [`crate::channel::ReliableChannel`] — that is how a sender whose ACK was
//! lost eventually makes progress.
//!
//! `delivered_ids` is never pruned; it grows by one entry per fragment the
//! peer ever sends over the channel.

use std::collections::{HashSet, VecDeque};

/// Receive-side state for a single channel.
#[derive(Debug, Default)]
pub struct Receiver {
    /// Fragment ids already appended to `app_buffer`.
    delivered_ids: HashSet<u64>,

    /// Delivered bytes not yet handed to the application, in order.
    app_buffer: VecDeque<u8>,
}

impl Receiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process the payload of DATA fragment `id`.
    ///
    /// Returns `true` if the fragment is new and its payload was buffered,
    /// `false` if `id` was delivered before (duplicate suppression).
    pub fn on_data(&mut self, id: u64, payload: &[u8]) -> bool {
        if !self.delivered_ids.insert(id) {
            return false;
        }
        self.app_buffer.extend(payload.iter().copied());
        true
    }

    /// `true` when fragment `id` has already been delivered.
    pub fn is_delivered(&self, id: u64) -> bool {
        self.delivered_ids.contains(&id)
    }

    /// Number of distinct fragments delivered so far.
    pub fn delivered_count(&self) -> usize {
        self.delivered_ids.len()
    }

    /// Bytes waiting to be read by the application.
    pub fn buffered(&self) -> usize {
        self.app_buffer.len()
    }

    /// Remove and return up to `n` bytes from the front of the buffer.
    pub fn read(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.app_buffer.len());
        self.app_buffer.drain(..n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state() {
        let r = Receiver::new();
        assert_eq!(r.buffered(), 0);
        assert_eq!(r.delivered_count(), 0);
        assert!(!r.is_delivered(1));
    }

    #[test]
    fn new_fragment_is_buffered() {
        let mut r = Receiver::new();
        assert!(r.on_data(1, b"hello"));
        assert!(r.is_delivered(1));
        assert_eq!(r.buffered(), 5);
        assert_eq!(r.read(5), b"hello");
    }

    #[test]
    fn duplicate_fragment_is_not_rebuffered() {
        let mut r = Receiver::new();
        assert!(r.on_data(1, b"abc"));
        assert!(!r.on_data(1, b"abc"));
        assert_eq!(r.buffered(), 3);
        assert_eq!(r.delivered_count(), 1);
    }

    #[test]
    fn duplicate_after_read_is_still_suppressed() {
        let mut r = Receiver::new();
        r.on_data(1, b"abc");
        assert_eq!(r.read(3), b"abc");
        assert!(!r.on_data(1, b"abc"));
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn empty_fragment_counts_as_delivered() {
        let mut r = Receiver::new();
        assert!(r.on_data(1, b""));
        assert!(r.is_delivered(1));
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn read_leaves_surplus_buffered() {
        let mut r = Receiver::new();
        r.on_data(1, b"hello ");
        r.on_data(2, b"world");
        assert_eq!(r.read(8), b"hello wo");
        assert_eq!(r.buffered(), 3);
        assert_eq!(r.read(100), b"rld");
        assert_eq!(r.read(1), b"");
    }
}
