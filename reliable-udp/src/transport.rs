//! The datagram capability the reliable channel is built on.
//!
//! A [`Datagram`] transport moves opaque frames over an unreliable medium.
//! It may silently drop any frame it is asked to send, and a receive waits
//! at most a bounded time before reporting [`Incoming::NoneArrived`].
//! Nothing above this trait knows whether frames travel over UDP
//! ([`crate::socket::UdpTransport`]), an in-process pair
//! ([`MemoryTransport`]) or a loss injector
//! ([`crate::simulator::LossyTransport`]).
//!
//! A transport is owned by exactly one channel; methods take `&self` only
//! so that wrappers can delegate without juggling borrows.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

/// Result of one bounded-wait receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A frame arrived.
    Datagram(Vec<u8>),
    /// The wait elapsed with nothing to deliver.
    NoneArrived,
    /// The transport knows the peer is gone and no frame will ever arrive.
    Closed,
}

/// Send/receive of opaque frames over a lossy medium.
pub trait Datagram: Send + Sync {
    /// Hand `frame` to the medium.
    ///
    /// Returns `frame.len()` whether or not the frame actually reaches the
    /// peer; only hard local failures are reported as errors.
    fn send_datagram(&self, frame: &[u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Wait up to `wait` for the next frame.
    ///
    /// Never fails on timeout: an elapsed wait is [`Incoming::NoneArrived`].
    fn recv_datagram(&self, wait: Duration)
        -> impl Future<Output = io::Result<Incoming>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryTransport
// ---------------------------------------------------------------------------

/// One end of an in-process, lossless datagram pair.
///
/// Frames sent on one end arrive at the other in order.  When one end is
/// dropped the other drains whatever is still queued and then reports
/// [`Incoming::Closed`]; sends towards a dropped end are silently lost, as
/// on a real network.
#[derive(Debug)]
pub struct MemoryTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryTransport {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: a_tx,
                rx: Mutex::new(a_rx),
            },
            Self {
                tx: b_tx,
                rx: Mutex::new(b_rx),
            },
        )
    }
}

impl Datagram for MemoryTransport {
    async fn send_datagram(&self, frame: &[u8]) -> io::Result<usize> {
        // A closed peer is indistinguishable from loss.
        let _ = self.tx.send(frame.to_vec());
        Ok(frame.len())
    }

    async fn recv_datagram(&self, wait: Duration) -> io::Result<Incoming> {
        let mut rx = self.rx.lock().await;
        Ok(match timeout(wait, rx.recv()).await {
            Ok(Some(frame)) => Incoming::Datagram(frame),
            Ok(None) => Incoming::Closed,
            Err(_elapsed) => Incoming::NoneArrived,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn frames_cross_the_pair_in_order() {
        let (a, b) = MemoryTransport::pair();
        assert_eq!(a.send_datagram(b"one").await.unwrap(), 3);
        a.send_datagram(b"two").await.unwrap();

        assert_eq!(
            b.recv_datagram(WAIT).await.unwrap(),
            Incoming::Datagram(b"one".to_vec())
        );
        assert_eq!(
            b.recv_datagram(WAIT).await.unwrap(),
            Incoming::Datagram(b"two".to_vec())
        );
    }

    #[tokio::test]
    async fn empty_wait_reports_none_arrived() {
        let (_a, b) = MemoryTransport::pair();
        assert_eq!(b.recv_datagram(WAIT).await.unwrap(), Incoming::NoneArrived);
    }

    #[tokio::test]
    async fn dropped_peer_drains_then_closes() {
        let (a, b) = MemoryTransport::pair();
        a.send_datagram(b"last words").await.unwrap();
        drop(a);

        assert_eq!(
            b.recv_datagram(WAIT).await.unwrap(),
            Incoming::Datagram(b"last words".to_vec())
        );
        assert_eq!(b.recv_datagram(WAIT).await.unwrap(), Incoming::Closed);
        // Sending into the void still looks successful.
        assert_eq!(b.send_datagram(b"anyone?").await.unwrap(), 7);
    }
}
