//! Fault-injecting network layer for deterministic testing.
//!
//! Real networks drop and duplicate packets.  To exercise the reliability
//! mechanisms without depending on actual network conditions,
//! [`LossyTransport`] wraps any [`Datagram`] transport and intercepts sends,
//! applying a configurable fault model:
//!
//! | Fault        | Description                                          |
//! |--------------|------------------------------------------------------|
//! | Packet loss  | Drop an outgoing frame with probability `loss_rate`. |
//! | Duplication  | Send an outgoing frame twice with `duplicate_rate`.  |
//!
//! Faults are decided by a [`StdRng`]; give [`LossConfig::seed`] to make a
//! run reproducible.  Receives pass straight through to the inner transport.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ChannelError;
use crate::transport::{Datagram, Incoming};

/// Configuration for the fault-injection model.
///
/// Probabilities must lie in `[0.0, 1.0)`: a link that drops everything can
/// never deliver anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LossConfig {
    /// Probability that any given outgoing frame is silently dropped.
    pub loss_rate: f64,
    /// Probability that a frame which was not dropped is sent twice.
    pub duplicate_rate: f64,
    /// RNG seed; `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl LossConfig {
    /// Loss only, reproducible from `seed`.
    pub fn seeded(loss_rate: f64, seed: u64) -> Self {
        Self {
            loss_rate,
            seed: Some(seed),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, p) in [
            ("loss_rate", self.loss_rate),
            ("duplicate_rate", self.duplicate_rate),
        ] {
            if !(0.0..1.0).contains(&p) {
                return Err(format!("{name} must be in [0, 1), got {p}"));
            }
        }
        Ok(())
    }
}

/// A fault-injecting wrapper around another transport.
#[derive(Debug)]
pub struct LossyTransport<T> {
    inner: T,
    config: LossConfig,
    rng: Mutex<StdRng>,
    dropped: AtomicU64,
    duplicated: AtomicU64,
}

/// Decision for one outgoing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Drop,
    Deliver,
    Duplicate,
}

impl<T: Datagram> LossyTransport<T> {
    pub fn new(inner: T, config: LossConfig) -> Result<Self, ChannelError> {
        config.validate().map_err(ChannelError::InvalidConfig)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            inner,
            config,
            rng: Mutex::new(rng),
            dropped: AtomicU64::new(0),
            duplicated: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &LossConfig {
        &self.config
    }

    /// Frames dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Frames sent twice so far.
    pub fn duplicated(&self) -> u64 {
        self.duplicated.load(Ordering::Relaxed)
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn roll(&self) -> Fate {
        // A poisoned lock only means another sender panicked mid-roll; the
        // RNG state is still usable.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        if rng.gen_bool(self.config.loss_rate) {
            Fate::Drop
        } else if rng.gen_bool(self.config.duplicate_rate) {
            Fate::Duplicate
        } else {
            Fate::Deliver
        }
    }
}

impl<T: Datagram> Datagram for LossyTransport<T> {
    async fn send_datagram(&self, frame: &[u8]) -> io::Result<usize> {
        match self.roll() {
            Fate::Drop => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::trace!("[sim] dropped {} byte frame", frame.len());
            }
            Fate::Deliver => {
                self.inner.send_datagram(frame).await?;
            }
            Fate::Duplicate => {
                self.duplicated.fetch_add(1, Ordering::Relaxed);
                self.inner.send_datagram(frame).await?;
                self.inner.send_datagram(frame).await?;
            }
        }
        Ok(frame.len())
    }

    async fn recv_datagram(&self, wait: Duration) -> io::Result<Incoming> {
        self.inner.recv_datagram(wait).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    const WAIT: Duration = Duration::from_millis(20);

    async fn count_arrivals(rx: &MemoryTransport) -> usize {
        let mut n = 0;
        while let Incoming::Datagram(_) = rx.recv_datagram(WAIT).await.unwrap() {
            n += 1;
        }
        n
    }

    #[tokio::test]
    async fn zero_loss_is_pass_through() {
        let (a, b) = MemoryTransport::pair();
        let lossy = LossyTransport::new(a, LossConfig::default()).unwrap();
        for _ in 0..20 {
            assert_eq!(lossy.send_datagram(b"frame").await.unwrap(), 5);
        }
        assert_eq!(count_arrivals(&b).await, 20);
        assert_eq!(lossy.dropped(), 0);
    }

    #[tokio::test]
    async fn dropped_frames_still_report_full_length() {
        let (a, b) = MemoryTransport::pair();
        let lossy = LossyTransport::new(a, LossConfig::seeded(0.5, 7)).unwrap();
        for _ in 0..200 {
            assert_eq!(lossy.send_datagram(b"x").await.unwrap(), 1);
        }
        let arrived = count_arrivals(&b).await as u64;
        assert_eq!(arrived + lossy.dropped(), 200);
        assert!(lossy.dropped() > 0 && arrived > 0);
    }

    #[tokio::test]
    async fn same_seed_same_fate() {
        let mut drops = Vec::new();
        for _ in 0..2 {
            let (a, _b) = MemoryTransport::pair();
            let lossy = LossyTransport::new(a, LossConfig::seeded(0.3, 42)).unwrap();
            for _ in 0..100 {
                lossy.send_datagram(b"x").await.unwrap();
            }
            drops.push(lossy.dropped());
        }
        assert_eq!(drops[0], drops[1]);
    }

    #[tokio::test]
    async fn duplication_sends_twice() {
        let (a, b) = MemoryTransport::pair();
        let config = LossConfig {
            duplicate_rate: 0.5,
            seed: Some(3),
            ..LossConfig::default()
        };
        let lossy = LossyTransport::new(a, config).unwrap();
        for _ in 0..50 {
            lossy.send_datagram(b"dup").await.unwrap();
        }
        assert_eq!(count_arrivals(&b).await as u64, 50 + lossy.duplicated());
        assert!(lossy.duplicated() > 0);
    }

    #[test]
    fn certain_loss_is_rejected() {
        let (a, _b) = MemoryTransport::pair();
        let err = LossyTransport::new(a, LossConfig::seeded(1.0, 1)).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidConfig(_)));
    }
}
