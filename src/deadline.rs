//! Bounded waits under a parent cancellation scope
//!
//! A [`Deadline`] is done when either its timeout elapses or its parent
//! [`CancellationToken`] is cancelled. Dropping it cancels its own child token,
//! which releases anything derived from it; every exit path of a wait is
//! therefore covered by scope.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use vm_e2e::deadline::{Deadline, DeadlineCause};
//!
//! # async fn run() {
//! let suite = CancellationToken::new();
//! let deadline = Deadline::new(&suite, Duration::from_secs(600));
//!
//! if let Err(cause) = deadline.sleep(Duration::from_secs(30)).await {
//!     assert!(matches!(cause, DeadlineCause::Expired | DeadlineCause::Cancelled));
//! }
//! # }
//! ```

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Upper bound for deadlines so `Instant` arithmetic never overflows
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Why a deadline is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineCause {
    /// The configured timeout elapsed
    Expired,
    /// The parent scope was cancelled
    Cancelled,
}

impl fmt::Display for DeadlineCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadlineCause::Expired => f.write_str("deadline expired"),
            DeadlineCause::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A timeout derived from a parent cancellation scope
#[derive(Debug)]
pub struct Deadline {
    token: CancellationToken,
    started: Instant,
    expires_at: Instant,
    timeout: Duration,
}

impl Deadline {
    /// Derive a deadline from `parent` that expires after `timeout`
    pub fn new(parent: &CancellationToken, timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            token: parent.child_token(),
            started,
            expires_at: expiry(started, timeout),
            timeout,
        }
    }

    /// Derive a nested deadline that never outlives this one
    pub fn child(&self, timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            token: self.token.child_token(),
            started,
            expires_at: expiry(started, timeout).min(self.expires_at),
            timeout,
        }
    }

    /// The configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left until expiry (zero once expired)
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Token cancelled with the parent scope or when this deadline is dropped
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Non-blocking check; cancellation wins over expiry
    pub fn cause(&self) -> Option<DeadlineCause> {
        if self.token.is_cancelled() {
            Some(DeadlineCause::Cancelled)
        } else if Instant::now() >= self.expires_at {
            Some(DeadlineCause::Expired)
        } else {
            None
        }
    }

    /// Resolve once the deadline is done
    pub async fn done(&self) -> DeadlineCause {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => DeadlineCause::Cancelled,
            _ = tokio::time::sleep_until(self.expires_at) => DeadlineCause::Expired,
        }
    }

    /// Sleep for `duration`, returning early if the deadline is done first
    pub async fn sleep(&self, duration: Duration) -> Result<(), DeadlineCause> {
        if let Some(cause) = self.cause() {
            return Err(cause);
        }
        tokio::select! {
            biased;
            cause = self.done() => Err(cause),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn expiry(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout.min(FAR_FUTURE))
        .unwrap_or_else(|| start + FAR_FUTURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_expires() {
        let parent = CancellationToken::new();
        let deadline = Deadline::new(&parent, Duration::from_millis(50));

        let start = std::time::Instant::now();
        assert_eq!(deadline.done().await, DeadlineCause::Expired);
        assert!(start.elapsed() >= Duration::from_millis(45));
        assert_eq!(deadline.cause(), Some(DeadlineCause::Expired));
    }

    #[tokio::test]
    async fn test_parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let deadline = Deadline::new(&parent, Duration::from_secs(60));

        let canceller = parent.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let start = std::time::Instant::now();
        assert_eq!(deadline.done().await, DeadlineCause::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_sleep_is_interrupted() {
        let parent = CancellationToken::new();
        let deadline = Deadline::new(&parent, Duration::from_millis(30));

        let start = std::time::Instant::now();
        let result = deadline.sleep(Duration::from_secs(10)).await;
        assert_eq!(result, Err(DeadlineCause::Expired));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_sleep_completes_before_deadline() {
        let parent = CancellationToken::new();
        let deadline = Deadline::new(&parent, Duration::from_secs(10));
        assert_eq!(deadline.sleep(Duration::from_millis(10)).await, Ok(()));
        assert!(deadline.cause().is_none());
    }

    #[tokio::test]
    async fn test_sleep_after_cancel_returns_immediately() {
        let parent = CancellationToken::new();
        parent.cancel();
        let deadline = Deadline::new(&parent, Duration::from_secs(10));
        assert_eq!(
            deadline.sleep(Duration::from_secs(10)).await,
            Err(DeadlineCause::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_child_never_outlives_parent_deadline() {
        let parent = CancellationToken::new();
        let outer = Deadline::new(&parent, Duration::from_millis(30));
        let inner = outer.child(Duration::from_secs(60));
        assert!(inner.remaining() <= Duration::from_millis(30));
        assert_eq!(inner.done().await, DeadlineCause::Expired);
    }

    #[tokio::test]
    async fn test_drop_releases_child_token() {
        let parent = CancellationToken::new();
        let deadline = Deadline::new(&parent, Duration::from_secs(60));
        let derived = deadline.token().clone();

        drop(deadline);
        assert!(derived.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_huge_timeout_does_not_overflow() {
        let parent = CancellationToken::new();
        let deadline = Deadline::new(&parent, Duration::MAX);
        assert!(deadline.remaining() > Duration::from_secs(60 * 60 * 24 * 365));
        assert_eq!(deadline.timeout(), Duration::MAX);
    }
}
