//! UDP implementation of the [`Datagram`] capability.
//!
//! [`UdpTransport`] is a thin wrapper around `tokio::net::UdpSocket` bound
//! to a local address and paired with a single remote peer.  All protocol
//! logic lives elsewhere; this module owns only byte I/O.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

use crate::transport::{Datagram, Incoming};

/// Maximum UDP payload size over IPv4 (65 535 − 8 byte UDP header − 20 byte
/// IP header).
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Receive errors that say nothing about the health of our own socket.
///
/// ICMP port-unreachable from an earlier send surfaces as
/// `ConnectionReset`/`ConnectionRefused` on some platforms; the peer may
/// simply not be bound yet.
fn is_transient_io_error(e: &io::Error) -> bool {
    use io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
    )
}

/// An async UDP socket that talks to exactly one peer.
///
/// Datagrams arriving from any other address are ignored.
#[derive(Debug)]
pub struct UdpTransport {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    peer: SocketAddr,
    inner: UdpSocket,
}

impl UdpTransport {
    /// Bind a new socket to `local_addr` and direct all traffic to `peer`.
    ///
    /// Passing `127.0.0.1:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr, peer: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        log::info!("UDP transport bound to {local_addr} (peer {peer})");
        Ok(Self {
            local_addr,
            peer,
            inner,
        })
    }

    /// Remote address all frames are sent to.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Re-target the transport, e.g. once the peer's ephemeral port is known.
    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = peer;
    }
}

impl Datagram for UdpTransport {
    async fn send_datagram(&self, frame: &[u8]) -> io::Result<usize> {
        match self.inner.send_to(frame, self.peer).await {
            Ok(n) => Ok(n),
            // Same as loss: the retransmit loop will try again.
            Err(e) if is_transient_io_error(&e) => {
                log::debug!("[udp] send to {} failed transiently: {e}", self.peer);
                Ok(frame.len())
            }
            Err(e) => Err(e),
        }
    }

    async fn recv_datagram(&self, wait: Duration) -> io::Result<Incoming> {
        let deadline = Instant::now() + wait;
        let mut buf = vec![0u8; MAX_UDP_PAYLOAD];

        loop {
            match timeout_at(deadline, self.inner.recv_from(&mut buf)).await {
                Err(_elapsed) => return Ok(Incoming::NoneArrived),
                Ok(Ok((n, addr))) if addr == self.peer => {
                    buf.truncate(n);
                    return Ok(Incoming::Datagram(buf));
                }
                Ok(Ok((n, addr))) => {
                    log::trace!("[udp] ignoring {n} bytes from foreign address {addr}");
                }
                Ok(Err(e)) if is_transient_io_error(&e) => {
                    log::trace!("[udp] transient receive error: {e}");
                }
                Ok(Err(e)) => return Err(e),
            }
        }
    }
}
