//! Optional per-channel protocol event file.
//!
//! When [`crate::config::ChannelConfig::event_log`] is set, every protocol
//! event is appended to that file as one line:
//!
//! ```text
//! <millis since channel open> <EVENT> <fields>
//! 12 DATA_SENT id=3 len=1463
//! 40 RETRANSMIT id=3 attempt=2
//! 41 ACK_RECEIVED id=3
//! ```
//!
//! The path belongs to one channel.  Two channels may point at the same
//! file; lines are written whole, so they interleave but do not tear.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::Path;
use std::time::Instant;

use crate::channel::Discard;
use crate::error::ChannelError;

/// One loggable protocol event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    DataSent { id: u64, len: usize },
    Retransmit { id: u64, attempt: u32 },
    AckReceived { id: u64 },
    DataReceived { id: u64, len: usize, duplicate: bool },
    AckSent { id: u64 },
    Discarded { reason: Discard },
    DeliveryFailed { id: u64, attempts: u32 },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataSent { id, len } => write!(f, "DATA_SENT id={id} len={len}"),
            Self::Retransmit { id, attempt } => write!(f, "RETRANSMIT id={id} attempt={attempt}"),
            Self::AckReceived { id } => write!(f, "ACK_RECEIVED id={id}"),
            Self::DataReceived { id, len, duplicate } => {
                write!(f, "DATA_RECEIVED id={id} len={len} duplicate={duplicate}")
            }
            Self::AckSent { id } => write!(f, "ACK_SENT id={id}"),
            Self::Discarded { reason } => write!(f, "DISCARDED reason={reason}"),
            Self::DeliveryFailed { id, attempts } => {
                write!(f, "DELIVERY_FAILED id={id} attempts={attempts}")
            }
        }
    }
}

/// Sink for [`Event`]s; a no-op when no path was configured.
#[derive(Debug)]
pub struct EventLog {
    opened_at: Instant,
    writer: Option<LineWriter<File>>,
}

impl EventLog {
    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self {
            opened_at: Instant::now(),
            writer: None,
        }
    }

    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> Result<Self, ChannelError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(ChannelError::EventLog)?;
        Ok(Self {
            opened_at: Instant::now(),
            writer: Some(LineWriter::new(file)),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// Append `event`.  A write failure disables the log rather than
    /// failing the protocol operation that produced the event.
    pub fn record(&mut self, event: Event) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let millis = self.opened_at.elapsed().as_millis();
        if let Err(e) = writeln!(writer, "{millis} {event}") {
            log::warn!("event log write failed, disabling: {e}");
            self.writer = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_lines_are_stable() {
        assert_eq!(
            Event::DataSent { id: 3, len: 10 }.to_string(),
            "DATA_SENT id=3 len=10"
        );
        assert_eq!(
            Event::DataReceived {
                id: 7,
                len: 0,
                duplicate: true
            }
            .to_string(),
            "DATA_RECEIVED id=7 len=0 duplicate=true"
        );
        assert_eq!(
            Event::Discarded {
                reason: Discard::Malformed
            }
            .to_string(),
            "DISCARDED reason=malformed"
        );
    }

    #[test]
    fn disabled_log_ignores_events() {
        let mut log = EventLog::disabled();
        log.record(Event::AckSent { id: 1 });
        assert!(!log.is_enabled());
    }

    #[test]
    fn open_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");

        {
            let mut log = EventLog::open(&path).unwrap();
            log.record(Event::AckSent { id: 1 });
            log.record(Event::AckReceived { id: 2 });
        }

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("ACK_SENT id=1"));
        assert!(lines[1].ends_with("ACK_RECEIVED id=2"));
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");

        EventLog::open(&path).unwrap().record(Event::AckSent { id: 1 });
        EventLog::open(&path).unwrap().record(Event::AckSent { id: 2 });

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn open_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("events.log");
        assert!(matches!(
            EventLog::open(&path),
            Err(ChannelError::EventLog(_))
        ));
    }
}
