// crates/jobs/src/policy.rs
//! Poll cadence and per-track handling of failed status fetches.

use std::time::Duration;

use posboard_core::{ErrorPolicy, PollingConfig, Track};

/// How a tracker polls its jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Fixed delay between status requests. The first request is sent one
    /// interval after submission.
    pub interval: Duration,
    /// Ceiling on how long a job may stay live. `None` polls forever.
    pub timeout: Option<Duration>,
    pub manual_on_error: ErrorPolicy,
    pub auto_on_error: ErrorPolicy,
}

impl PollPolicy {
    pub fn on_error(&self, track: Track) -> ErrorPolicy {
        match track {
            Track::Auto => self.auto_on_error,
            Track::Manual => self.manual_on_error,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms.max(1)),
            timeout: config
                .timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            manual_on_error: config.manual_on_error,
            auto_on_error: config.auto_on_error,
        }
    }
}

/// Decision after a failed status fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorVerdict {
    /// Keep polling; `consecutive` failures so far.
    Retry { consecutive: u32 },
    /// Mark the job failed.
    GiveUp,
}

/// Counts consecutive failures for one poll loop.
#[derive(Debug)]
pub(crate) struct FailureCounter {
    policy: ErrorPolicy,
    consecutive: u32,
}

impl FailureCounter {
    pub(crate) fn new(policy: ErrorPolicy) -> Self {
        Self {
            policy,
            consecutive: 0,
        }
    }

    pub(crate) fn record(&mut self) -> ErrorVerdict {
        self.consecutive += 1;
        match self.policy {
            ErrorPolicy::FailFast => ErrorVerdict::GiveUp,
            ErrorPolicy::Retry { max_consecutive } if self.consecutive >= max_consecutive => {
                ErrorVerdict::GiveUp
            }
            ErrorPolicy::Retry { .. } => ErrorVerdict::Retry {
                consecutive: self.consecutive,
            },
        }
    }

    pub(crate) fn reset(&mut self) {
        self.consecutive = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_matches_config_defaults() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(policy.timeout, Some(Duration::from_secs(1800)));
        assert_eq!(policy.on_error(Track::Manual), ErrorPolicy::FailFast);
        assert_eq!(
            policy.on_error(Track::Auto),
            ErrorPolicy::Retry { max_consecutive: 5 }
        );
    }

    #[test]
    fn test_zero_timeout_disables_ceiling() {
        let config = PollingConfig {
            timeout_secs: Some(0),
            ..PollingConfig::default()
        };
        assert_eq!(PollPolicy::from(&config).timeout, None);
    }

    #[test]
    fn test_fail_fast_gives_up_at_once() {
        let mut counter = FailureCounter::new(ErrorPolicy::FailFast);
        assert_eq!(counter.record(), ErrorVerdict::GiveUp);
    }

    #[test]
    fn test_retry_counts_consecutive_failures() {
        let mut counter = FailureCounter::new(ErrorPolicy::Retry { max_consecutive: 3 });
        assert_eq!(counter.record(), ErrorVerdict::Retry { consecutive: 1 });
        assert_eq!(counter.record(), ErrorVerdict::Retry { consecutive: 2 });
        counter.reset();
        assert_eq!(counter.record(), ErrorVerdict::Retry { consecutive: 1 });
        assert_eq!(counter.record(), ErrorVerdict::Retry { consecutive: 2 });
        assert_eq!(counter.record(), ErrorVerdict::GiveUp);
    }
}
