//! Errors surfaced to callers of [`crate::channel::ReliableChannel`].
//!
//! Malformed datagrams ([`crate::packet::PacketError`]) never show up here:
//! the channel discards them and keeps waiting.  A bounded wait that ends
//! with nothing useful is not an error either; it drives retransmission.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    /// Hard failure of the underlying datagram transport.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The transport reported that the peer end is gone.
    #[error("transport closed by peer")]
    Closed,

    /// The retry ceiling was reached without an ACK for fragment `id`.
    #[error("fragment {id} not acknowledged after {attempts} attempt(s)")]
    DeliveryFailed { id: u64, attempts: u32 },

    /// Configuration rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured event log file could not be opened.
    #[error("cannot open event log: {0}")]
    EventLog(#[source] io::Error),
}

impl ChannelError {
    /// `true` for [`ChannelError::DeliveryFailed`].
    pub fn is_delivery_failed(&self) -> bool {
        matches!(self, Self::DeliveryFailed { .. })
    }
}
