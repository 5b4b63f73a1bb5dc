//! Polling cadence and back-off tunables.

use std::time::Duration;

/// Poll loop tunables. The exact values are cadence knobs, not correctness
/// properties; override per deployment via env or the struct fields.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Delay between successful polls of a non-terminal job.
    pub interval: Duration,
    /// Cap for the exponential back-off applied after failed polls.
    pub max_backoff: Duration,
    /// Consecutive failures tolerated before the job is marked failed
    /// locally ("polling exhausted") and the loop stops.
    pub max_failures: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_backoff: Duration::from_secs(60),
            max_failures: 5,
        }
    }
}

impl PollConfig {
    /// Read overrides from `GRADE_POLL_INTERVAL_MS`,
    /// `GRADE_POLL_MAX_BACKOFF_MS` and `GRADE_POLL_MAX_FAILURES`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: env_millis("GRADE_POLL_INTERVAL_MS").unwrap_or(defaults.interval),
            max_backoff: env_millis("GRADE_POLL_MAX_BACKOFF_MS").unwrap_or(defaults.max_backoff),
            max_failures: std::env::var("GRADE_POLL_MAX_FAILURES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_failures),
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}
