//! Channel phase types.
//!
//! A [`crate::channel::ReliableChannel`] has no connection-open or close
//! states: it is ready as soon as both peers' transports are bound.  The
//! only thing worth observing is which loop, if any, it is currently in.
//!
//! ```text
//!            send(buf)                      recv(n)
//!   IDLE ───────────────▶ AWAITING_ACK   IDLE ───────────▶ AWAITING_DATA
//!    ▲   matching ACK for  │  timeout:     ▲  n bytes        │  new: deliver + ACK
//!    │   the last fragment │  retransmit   │  buffered       │  duplicate: ACK only
//!    └─────────────────────┘               └─────────────────┘
//! ```

/// What the channel is doing right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelState {
    /// Neither `send` nor `recv` is running.
    #[default]
    Idle,
    /// `send` is waiting for the ACK of fragment `id`.
    AwaitingAck { id: u64 },
    /// `recv` is waiting for more DATA.
    AwaitingData,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("IDLE"),
            Self::AwaitingAck { id } => write!(f, "AWAITING_ACK({id})"),
            Self::AwaitingData => f.write_str("AWAITING_DATA"),
        }
    }
}
