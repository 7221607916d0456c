//! Retransmission policy and the per-fragment retransmit timer.
//!
//! Reliable delivery requires that an unacknowledged fragment is re-sent if
//! no ACK arrives within a bounded wait.  This module provides:
//! - [`RetryPolicy`] — the injectable knobs: how long one bounded wait lasts,
//!   how the wait grows after each timeout, and whether there is a ceiling
//!   on transmissions.
//! - [`RetransmitTimer`] — applies a policy to one in-flight fragment,
//!   tracking the current wait and the number of transmissions so far.
//!
//! The default policy reproduces the classic stop-and-wait loop: a constant
//! wait, no backoff, and no ceiling.  With no ceiling a permanently
//! partitioned peer blocks `send` forever; set
//! [`RetryPolicy::max_attempts`] to turn that into
//! [`crate::error::ChannelError::DeliveryFailed`].

use std::time::Duration;

/// Default bounded wait for one receive attempt.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(200);

/// Default cap on the wait once backoff is enabled.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5);

/// How the sender waits for and retries an unacknowledged fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Bounded wait for the first receive attempt after a transmission.
    pub ack_timeout: Duration,
    /// Maximum number of transmissions of one fragment (first send
    /// included).  `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Factor applied to the wait after every timeout.  `1.0` keeps it
    /// constant.
    pub backoff: f64,
    /// Upper bound for the wait after repeated backoff.
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    /// Constant [`DEFAULT_ACK_TIMEOUT`] wait, unbounded retries.
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_attempts: None,
            backoff: 1.0,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl RetryPolicy {
    /// Constant-wait policy that gives up after `max_attempts` transmissions.
    pub fn bounded(ack_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            ack_timeout,
            max_attempts: Some(max_attempts),
            backoff: 1.0,
            max_wait: DEFAULT_MAX_WAIT.max(ack_timeout),
        }
    }

    /// Enable exponential backoff by `factor`, capped at `max_wait`.
    pub fn with_backoff(mut self, factor: f64, max_wait: Duration) -> Self {
        self.backoff = factor;
        self.max_wait = max_wait;
        self
    }

    /// Check the policy for values that would make the send loop misbehave.
    pub fn validate(&self) -> Result<(), String> {
        if self.ack_timeout.is_zero() {
            return Err("ack_timeout must be non-zero".into());
        }
        if self.max_attempts == Some(0) {
            return Err("max_attempts must be at least 1".into());
        }
        if !self.backoff.is_finite() || self.backoff < 1.0 {
            return Err(format!("backoff must be >= 1.0, got {}", self.backoff));
        }
        if self.max_wait < self.ack_timeout {
            return Err("max_wait must not be shorter than ack_timeout".into());
        }
        Ok(())
    }

    /// Longest gap between two transmissions of one fragment.
    ///
    /// A receiver that hears nothing for a few of these can assume its peer
    /// has stopped retransmitting.
    pub fn longest_wait(&self) -> Duration {
        if self.backoff > 1.0 {
            self.max_wait
        } else {
            self.ack_timeout
        }
    }
}

// ---------------------------------------------------------------------------
// RetransmitTimer
// ---------------------------------------------------------------------------

/// Outcome of [`RetransmitTimer::on_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    /// Retransmit and wait again for [`RetransmitTimer::current_wait`].
    Retry,
    /// The ceiling has been reached; the fragment is undeliverable.
    GiveUp,
}

/// Retry state for the single in-flight fragment.
#[derive(Debug, Clone)]
pub struct RetransmitTimer {
    policy: RetryPolicy,
    /// Wait to use for the next receive attempt.
    current_wait: Duration,
    /// Transmissions of the current fragment so far.
    attempts: u32,
}

impl RetransmitTimer {
    pub fn new(policy: RetryPolicy) -> Self {
        let current_wait = policy.ack_timeout;
        Self {
            policy,
            current_wait,
            attempts: 0,
        }
    }

    /// Start tracking a freshly sent fragment: one transmission, base wait.
    pub fn arm(&mut self) {
        self.attempts = 1;
        self.current_wait = self.policy.ack_timeout;
    }

    /// A bounded wait ended without the matching ACK.
    ///
    /// Returns [`TimeoutOutcome::GiveUp`] once `max_attempts` transmissions
    /// have been made; otherwise counts the upcoming retransmission, backs
    /// the wait off and returns [`TimeoutOutcome::Retry`].
    pub fn on_timeout(&mut self) -> TimeoutOutcome {
        if let Some(max) = self.policy.max_attempts {
            if self.attempts >= max {
                return TimeoutOutcome::GiveUp;
            }
        }
        self.attempts += 1;
        self.back_off();
        TimeoutOutcome::Retry
    }

    /// Multiply the wait by the backoff factor, capped at `max_wait`.
    ///
    /// A product too large for a `Duration` is simply the cap.
    fn back_off(&mut self) {
        if self.policy.backoff > 1.0 {
            let grown = self.current_wait.as_secs_f64() * self.policy.backoff;
            self.current_wait = Duration::try_from_secs_f64(grown)
                .map_or(self.policy.max_wait, |w| w.min(self.policy.max_wait));
        }
    }

    /// Bounded wait for the next receive attempt.
    pub fn current_wait(&self) -> Duration {
        self.current_wait
    }

    /// Number of transmissions of the current fragment.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_never_gives_up() {
        let mut t = RetransmitTimer::new(RetryPolicy::default());
        t.arm();
        for _ in 0..1000 {
            assert_eq!(t.on_timeout(), TimeoutOutcome::Retry);
        }
        assert_eq!(t.attempts(), 1001);
        assert_eq!(t.current_wait(), DEFAULT_ACK_TIMEOUT);
    }

    #[test]
    fn bounded_policy_gives_up_after_max_attempts() {
        let mut t = RetransmitTimer::new(RetryPolicy::bounded(Duration::from_millis(10), 3));
        t.arm();
        assert_eq!(t.on_timeout(), TimeoutOutcome::Retry); // 2nd send
        assert_eq!(t.on_timeout(), TimeoutOutcome::Retry); // 3rd send
        assert_eq!(t.on_timeout(), TimeoutOutcome::GiveUp);
        assert_eq!(t.attempts(), 3);
    }

    #[test]
    fn single_attempt_policy_gives_up_on_first_timeout() {
        let mut t = RetransmitTimer::new(RetryPolicy::bounded(Duration::from_millis(10), 1));
        t.arm();
        assert_eq!(t.on_timeout(), TimeoutOutcome::GiveUp);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::bounded(Duration::from_millis(100), 10)
            .with_backoff(2.0, Duration::from_millis(500));
        let mut t = RetransmitTimer::new(policy);
        t.arm();
        t.on_timeout();
        assert_eq!(t.current_wait(), Duration::from_millis(200));
        t.on_timeout();
        assert_eq!(t.current_wait(), Duration::from_millis(400));
        t.on_timeout();
        assert_eq!(t.current_wait(), Duration::from_millis(500));
    }

    #[test]
    fn huge_backoff_saturates_at_max_wait() {
        let policy = RetryPolicy::default().with_backoff(1e30, DEFAULT_MAX_WAIT);
        assert!(policy.validate().is_ok());
        let mut t = RetransmitTimer::new(policy);
        t.arm();
        for _ in 0..3 {
            assert_eq!(t.on_timeout(), TimeoutOutcome::Retry);
            assert_eq!(t.current_wait(), DEFAULT_MAX_WAIT);
        }
    }

    #[test]
    fn arm_resets_wait_and_attempts() {
        let policy = RetryPolicy::default().with_backoff(2.0, Duration::from_secs(1));
        let mut t = RetransmitTimer::new(policy);
        t.arm();
        t.on_timeout();
        t.on_timeout();
        t.arm();
        assert_eq!(t.attempts(), 1);
        assert_eq!(t.current_wait(), DEFAULT_ACK_TIMEOUT);
    }

    #[test]
    fn longest_wait_follows_backoff() {
        let constant = RetryPolicy::bounded(Duration::from_millis(50), 3);
        assert_eq!(constant.longest_wait(), Duration::from_millis(50));

        let growing = constant.with_backoff(2.0, Duration::from_millis(800));
        assert_eq!(growing.longest_wait(), Duration::from_millis(800));
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(RetryPolicy::default().validate().is_ok());

        let zero_wait = RetryPolicy {
            ack_timeout: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert!(zero_wait.validate().is_err());

        assert!(RetryPolicy::bounded(Duration::from_millis(5), 0)
            .validate()
            .is_err());

        let shrinking = RetryPolicy::default().with_backoff(0.5, DEFAULT_MAX_WAIT);
        assert!(shrinking.validate().is_err());
    }
}
