//! Wait results and failure reports
//!
//! A waiter returns a [`WaitOutcome`]. Callers that want `?` convert it with
//! [`WaitOutcome::into_result`], which builds a [`WaitError`] carrying a
//! [`WaitReport`] for timeouts and permanent failures.
//!
//! # Example
//!
//! ```ignore
//! match harness.wait_until_operational(ResourceKind::VMSingle, "vm", "overwatch", timeout).await {
//!     Err(WaitError::TimedOut(report)) => {
//!         println!("Resource: {}", report.resource);
//!         println!("Last state: {}", report.last_state_description());
//!         for event in &report.events {
//!             println!("  {} - {}", event.reason, event.message);
//!         }
//!     }
//!     _ => {}
//! }
//! ```

use crate::config::ConfigError;
use crate::deadline::DeadlineCause;
use crate::provider::ProviderError;
use crate::resource::ResourceRef;
use crate::state::ResourceState;
use std::fmt;
use std::time::Duration;

/// Why a wait stopped without its condition holding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutCause {
    DeadlineExpired,
    /// The parent scope was cancelled (e.g. the suite is aborting)
    Cancelled,
    /// The poll retry budget ran out before the deadline
    RetriesExhausted { attempts: u32 },
}

impl From<DeadlineCause> for TimeoutCause {
    fn from(cause: DeadlineCause) -> Self {
        match cause {
            DeadlineCause::Expired => TimeoutCause::DeadlineExpired,
            DeadlineCause::Cancelled => TimeoutCause::Cancelled,
        }
    }
}

impl fmt::Display for TimeoutCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutCause::DeadlineExpired => f.write_str("deadline expired"),
            TimeoutCause::Cancelled => f.write_str("cancelled"),
            TimeoutCause::RetriesExhausted { attempts } => {
                write!(f, "retry budget exhausted after {attempts} attempts")
            }
        }
    }
}

/// Result of one wait operation
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// The condition holds on this snapshot
    Satisfied(ResourceState),
    TimedOut {
        cause: TimeoutCause,
        last_state: Option<ResourceState>,
    },
    /// The resource reached a state that can never satisfy the condition
    PermanentFailure {
        reason: String,
        state: Option<ResourceState>,
    },
    /// The provider failed in a way the waiter does not retry
    TransientError(ProviderError),
}

impl WaitOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, WaitOutcome::Satisfied(_))
    }

    /// Convert into a `Result`, attaching target identity and timing
    pub fn into_result(
        self,
        target: &ResourceRef,
        condition: &str,
        timeout: Duration,
        elapsed: Duration,
    ) -> Result<ResourceState, WaitError> {
        match self {
            WaitOutcome::Satisfied(state) => Ok(state),
            WaitOutcome::TimedOut { cause, last_state } => Err(WaitError::TimedOut(
                WaitReport::new(target.clone(), condition, timeout, elapsed)
                    .with_state(last_state)
                    .with_cause(cause),
            )),
            WaitOutcome::PermanentFailure { reason, state } => Err(WaitError::PermanentFailure(
                WaitReport::new(target.clone(), condition, timeout, elapsed)
                    .with_state(state)
                    .with_reason(reason),
            )),
            WaitOutcome::TransientError(source) => Err(WaitError::Transient {
                resource: target.clone(),
                timeout,
                elapsed,
                source,
            }),
        }
    }
}

/// A simplified event for wait error context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitEvent {
    /// Event reason (e.g., "FailedCreate", "BackOff")
    pub reason: String,
    pub message: String,
    /// `HH:MM:SS`
    pub timestamp: Option<String>,
}

/// Debugging context for a failed wait
#[derive(Debug, Clone, PartialEq)]
pub struct WaitReport {
    pub resource: ResourceRef,
    /// Description of the condition that was awaited
    pub condition: String,
    pub last_state: Option<ResourceState>,
    pub elapsed: Duration,
    /// The timeout that was configured
    pub timeout: Duration,
    /// Set for timeouts
    pub cause: Option<TimeoutCause>,
    /// Set for permanent failures: the status that triggered them
    pub reason: Option<String>,
    /// Recent events related to the resource
    pub events: Vec<WaitEvent>,
}

impl WaitReport {
    pub fn new(
        resource: ResourceRef,
        condition: impl Into<String>,
        timeout: Duration,
        elapsed: Duration,
    ) -> Self {
        Self {
            resource,
            condition: condition.into(),
            last_state: None,
            elapsed,
            timeout,
            cause: None,
            reason: None,
            events: Vec::new(),
        }
    }

    pub fn with_state(mut self, state: Option<ResourceState>) -> Self {
        self.last_state = state;
        self
    }

    pub fn with_cause(mut self, cause: TimeoutCause) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_events(mut self, events: Vec<WaitEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn last_state_description(&self) -> String {
        self.last_state
            .as_ref()
            .map(ResourceState::describe)
            .unwrap_or_else(|| "never observed".to_string())
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, headline: &str) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "{} {}", headline, self.resource)?;
        writeln!(f, "├─ Condition: {}", self.condition)?;
        if let Some(reason) = &self.reason {
            writeln!(f, "├─ Reason: {}", reason)?;
        }
        if let Some(cause) = &self.cause {
            writeln!(f, "├─ Cause: {}", cause)?;
        }
        writeln!(f, "├─ Last state: {}", self.last_state_description())?;
        writeln!(f, "├─ Elapsed: {:?}", self.elapsed)?;
        writeln!(f, "└─ Timeout: {:?}", self.timeout)?;

        if !self.events.is_empty() {
            writeln!(f)?;
            writeln!(f, "Recent events:")?;
            for (i, event) in self.events.iter().enumerate() {
                let prefix = if i == self.events.len() - 1 {
                    "└─"
                } else {
                    "├─"
                };
                let ts = event.timestamp.as_deref().unwrap_or("??:??:??");
                writeln!(f, "{} [{}] {}: {}", prefix, ts, event.reason, event.message)?;
            }
        }

        Ok(())
    }
}

/// Error type for wait operations
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("{}", Tree(.0, "Wait timeout for"))]
    TimedOut(WaitReport),

    #[error("{}", Tree(.0, "Permanent failure for"))]
    PermanentFailure(WaitReport),

    #[error("failed to observe {resource} after {elapsed:?} (timeout {timeout:?}): {source}")]
    Transient {
        resource: ResourceRef,
        timeout: Duration,
        elapsed: Duration,
        #[source]
        source: ProviderError,
    },

    #[error("invalid wait configuration: {0}")]
    Configuration(#[from] ConfigError),
}

impl WaitError {
    /// The report for timeouts and permanent failures
    pub fn report(&self) -> Option<&WaitReport> {
        match self {
            WaitError::TimedOut(report) | WaitError::PermanentFailure(report) => Some(report),
            _ => None,
        }
    }

    pub(crate) fn report_mut(&mut self) -> Option<&mut WaitReport> {
        match self {
            WaitError::TimedOut(report) | WaitError::PermanentFailure(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::TimedOut(_))
    }

    /// Whether the parent scope was cancelled rather than the wait timing out
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            WaitError::TimedOut(WaitReport {
                cause: Some(TimeoutCause::Cancelled),
                ..
            })
        )
    }
}

struct Tree<'a>(&'a WaitReport, &'a str);

impl fmt::Display for Tree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.write_tree(f, self.1)
    }
}
