use crate::config::ConfigError;
use std::time::Duration;

/// Fallback interval for poll waits that carry no schedule
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum number of polls that fit in `total_wait`: `floor(total_wait / interval)`
///
/// This is a secondary bound; the wait deadline is always authoritative.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use vm_e2e::wait::retry_budget;
///
/// assert_eq!(retry_budget(Duration::from_secs(600), Duration::from_secs(30)).unwrap(), 20);
/// assert!(retry_budget(Duration::from_secs(600), Duration::ZERO).is_err());
/// ```
pub fn retry_budget(total_wait: Duration, interval: Duration) -> Result<u32, ConfigError> {
    if interval.is_zero() {
        return Err(ConfigError::ZeroInterval);
    }
    let retries = total_wait.as_nanos() / interval.as_nanos();
    Ok(u32::try_from(retries).unwrap_or(u32::MAX))
}

/// Polling interval plus the retry budget derived from it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    interval: Duration,
    max_retries: u32,
}

impl PollSchedule {
    /// Schedule for polling every `interval` within `total_wait`
    pub fn new(total_wait: Duration, interval: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            interval,
            max_retries: retry_budget(total_wait, interval)?,
        })
    }

    /// Schedule used when a poll wait was built without one
    pub fn fallback(total_wait: Duration) -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            // DEFAULT_POLL_INTERVAL is non-zero
            max_retries: retry_budget(total_wait, DEFAULT_POLL_INTERVAL).unwrap_or(u32::MAX),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Retries allowed after the first fetch
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total fetches allowed: the first one plus every retry
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}
