//! Pull session configuration and accounting.

use std::time::Duration;

use sluice_core::broker::ReceiveSettings;

/// Configuration for one bounded pull session.
///
/// Owned by exactly one [`PullCoordinator`](crate::PullCoordinator) run and
/// immutable once the session starts. `max_messages` and `max_extension`
/// only apply to synchronous (bounded-count) sessions; streaming sessions
/// run until the deadline regardless of count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullSessionConfig {
    /// Bounded-count mode when true, duration-bounded otherwise.
    pub synchronous: bool,
    /// Wall-clock budget for the session.
    pub deadline: Duration,
    /// Message cap for synchronous sessions.
    pub max_messages: u64,
    /// Ack-extension window handed to the broker (synchronous only).
    pub max_extension: Option<Duration>,
    /// Cap on unacknowledged messages outstanding at once.
    pub max_outstanding_messages: usize,
    /// Cap on unacknowledged bytes outstanding at once.
    pub max_outstanding_bytes: usize,
    /// Concurrent delivery callbacks the broker may run.
    pub delivery_parallelism: usize,
}

impl PullSessionConfig {
    /// Bounded-count session: ends after `max_messages` persisted messages
    /// or at `deadline`, whichever comes first.
    pub fn synchronous(max_messages: u64, deadline: Duration) -> Self {
        Self {
            synchronous: true,
            deadline,
            max_messages,
            max_extension: None,
            max_outstanding_messages: 100,
            max_outstanding_bytes: 100 << 20,
            delivery_parallelism: 4,
        }
    }

    /// Duration-bounded session: ends at `deadline` regardless of count.
    pub fn streaming(deadline: Duration) -> Self {
        Self {
            synchronous: false,
            deadline,
            max_messages: 0,
            max_extension: None,
            max_outstanding_messages: 100,
            max_outstanding_bytes: 100 << 20,
            delivery_parallelism: 4,
        }
    }

    /// Flow-control view handed to the broker.
    pub(crate) fn receive_settings(&self) -> ReceiveSettings {
        ReceiveSettings {
            synchronous: self.synchronous,
            max_extension: self.max_extension,
            max_outstanding_messages: self.max_outstanding_messages,
            max_outstanding_bytes: self.max_outstanding_bytes,
            parallelism: self.delivery_parallelism,
        }
    }
}

/// Final accounting for a completed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    /// Messages persisted and acknowledged by this session.
    pub delivered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_settings_mirror_the_session() {
        let config = PullSessionConfig {
            max_extension: Some(Duration::from_secs(60)),
            max_outstanding_messages: 7,
            max_outstanding_bytes: 1 << 20,
            delivery_parallelism: 3,
            ..PullSessionConfig::synchronous(10, Duration::from_secs(30))
        };

        let settings = config.receive_settings();
        assert!(settings.synchronous);
        assert_eq!(settings.max_extension, Some(Duration::from_secs(60)));
        assert_eq!(settings.max_outstanding_messages, 7);
        assert_eq!(settings.max_outstanding_bytes, 1 << 20);
        assert_eq!(settings.parallelism, 3);
    }

    #[test]
    fn streaming_sessions_carry_no_cap() {
        let config = PullSessionConfig::streaming(Duration::from_secs(5));
        assert!(!config.synchronous);
        assert_eq!(config.max_messages, 0);
        assert_eq!(config.max_extension, None);
    }
}
