//! Per-channel configuration.
//!
//! Everything a [`crate::channel::ReliableChannel`] needs to know is passed
//! in a [`ChannelConfig`] at construction; there is no process-wide state.

use std::path::PathBuf;

use crate::error::ChannelError;
use crate::packet::HEADER_LEN;
use crate::retry::RetryPolicy;
use crate::socket::MAX_UDP_PAYLOAD;

/// Default maximum frame size: one Ethernet MTU minus IPv4 and UDP headers.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1472;

/// Adjustable channel parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Largest datagram the channel will put on the wire, header included.
    pub max_frame_size: usize,
    /// Bounded wait, backoff and retry ceiling for unacknowledged fragments.
    pub retry: RetryPolicy,
    /// Append protocol events to this file when set.
    pub event_log: Option<PathBuf>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            retry: RetryPolicy::default(),
            event_log: None,
        }
    }
}

impl ChannelConfig {
    /// Largest fragment payload: `max_frame_size - HEADER_LEN`.
    pub fn max_fragment_payload(&self) -> usize {
        self.max_frame_size.saturating_sub(HEADER_LEN)
    }

    /// Same config with the frame size chosen so that fragments carry at
    /// most `payload` bytes.
    pub fn with_fragment_payload(mut self, payload: usize) -> Self {
        self.max_frame_size = payload + HEADER_LEN;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_event_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.event_log = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.max_frame_size <= HEADER_LEN || self.max_frame_size > MAX_UDP_PAYLOAD {
            return Err(ChannelError::InvalidConfig(format!(
                "max_frame_size must be in {}..={MAX_UDP_PAYLOAD}, got {}",
                HEADER_LEN + 1,
                self.max_frame_size
            )));
        }
        self.retry.validate().map_err(ChannelError::InvalidConfig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn default_is_valid() {
        let config = ChannelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_fragment_payload(), DEFAULT_MAX_FRAME_SIZE - 9);
    }

    #[test]
    fn fragment_payload_helper_adds_header() {
        let config = ChannelConfig::default().with_fragment_payload(1000);
        assert_eq!(config.max_frame_size, 1009);
        assert_eq!(config.max_fragment_payload(), 1000);
    }

    #[test]
    fn frame_size_bounds_are_enforced() {
        let too_small = ChannelConfig {
            max_frame_size: HEADER_LEN,
            ..ChannelConfig::default()
        };
        assert!(matches!(
            too_small.validate(),
            Err(ChannelError::InvalidConfig(_))
        ));

        let too_big = ChannelConfig {
            max_frame_size: MAX_UDP_PAYLOAD + 1,
            ..ChannelConfig::default()
        };
        assert!(too_big.validate().is_err());

        let smallest = ChannelConfig::default().with_fragment_payload(1);
        assert!(smallest.validate().is_ok());
    }

    #[test]
    fn retry_policy_is_validated() {
        let config =
            ChannelConfig::default().with_retry(RetryPolicy::bounded(Duration::from_millis(1), 0));
        assert!(config.validate().is_err());
    }
}
