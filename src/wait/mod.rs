//! Waiting for resources to become ready
//!
//! A [`WaitSpec`] describes one wait: target, condition, timeout and (for
//! polls) a [`PollSchedule`]. Two [`Waiter`] implementations run it:
//!
//! - [`WatchWaiter`]: subscribes to the resource's change stream
//! - [`PollWaiter`]: re-fetches the resource on a fixed interval
//!
//! Both race every suspension point against a [`Deadline`], so cancelling the
//! parent scope unblocks them promptly.

mod budget;
mod outcome;
mod poll;
mod watch;

pub use budget::{retry_budget, PollSchedule, DEFAULT_POLL_INTERVAL};
pub use outcome::{TimeoutCause, WaitError, WaitEvent, WaitOutcome, WaitReport};
pub use poll::PollWaiter;
pub use watch::WatchWaiter;

use crate::config::ConfigError;
use crate::deadline::Deadline;
use crate::predicate::Condition;
use crate::provider::StateProvider;
use crate::resource::ResourceRef;
use crate::state::ResourceState;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Configuration for one wait operation
#[derive(Debug, Clone, PartialEq)]
pub struct WaitSpec {
    pub target: ResourceRef,
    pub condition: Condition,
    pub timeout: Duration,
    /// Poll interval and retry budget; ignored by watch waits
    pub schedule: Option<PollSchedule>,
}

impl WaitSpec {
    pub fn new(target: ResourceRef, condition: Condition, timeout: Duration) -> Self {
        Self {
            target,
            condition,
            timeout,
            schedule: None,
        }
    }

    /// Poll every `interval`, with the retry budget derived from the timeout
    pub fn poll_every(mut self, interval: Duration) -> Result<Self, ConfigError> {
        self.schedule = Some(PollSchedule::new(self.timeout, interval)?);
        Ok(self)
    }

    /// The schedule poll waits use
    pub fn effective_schedule(&self) -> PollSchedule {
        self.schedule
            .unwrap_or_else(|| PollSchedule::fallback(self.timeout))
    }
}

/// Strategy for running a [`WaitSpec`]
#[async_trait]
pub trait Waiter: Send + Sync {
    /// Wait until `spec.condition` holds, fails permanently, or `deadline` is done
    async fn wait(&self, spec: &WaitSpec, deadline: &Deadline) -> WaitOutcome;
}

/// Run one wait under a fresh deadline derived from `parent`
///
/// Failures carry the target, timeout and elapsed time, plus recent events
/// fetched from `provider`.
pub async fn run_wait(
    waiter: &dyn Waiter,
    provider: &dyn StateProvider,
    spec: &WaitSpec,
    parent: &CancellationToken,
) -> Result<ResourceState, WaitError> {
    let start = Instant::now();
    let outcome = {
        let deadline = Deadline::new(parent, spec.timeout);
        waiter.wait(spec, &deadline).await
    };
    let elapsed = start.elapsed();
    let condition = spec.condition.describe();

    match outcome.into_result(&spec.target, &condition, spec.timeout, elapsed) {
        Ok(state) => {
            info!(
                resource = %spec.target,
                condition = %condition,
                elapsed = ?elapsed,
                "condition satisfied"
            );
            Ok(state)
        }
        Err(mut err) => {
            warn!(resource = %spec.target, elapsed = ?elapsed, error = %err, "wait failed");
            if let Some(report) = err.report_mut() {
                if !parent.is_cancelled() {
                    report.events = provider.recent_events(&spec.target).await;
                }
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ScriptedProvider;
    use crate::resource::ResourceKind;
    use std::sync::Arc;

    fn svc() -> ResourceRef {
        ResourceRef::new(ResourceKind::Service, "ingress-nginx", "controller")
    }

    #[test]
    fn test_poll_every_derives_budget() {
        let spec = WaitSpec::new(svc(), Condition::LoadBalancerAssigned, Duration::from_secs(600))
            .poll_every(Duration::from_secs(30))
            .unwrap();
        let schedule = spec.effective_schedule();
        assert_eq!(schedule.max_retries(), 20);
        assert_eq!(schedule.interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_poll_every_rejects_zero() {
        let result = WaitSpec::new(svc(), Condition::LoadBalancerAssigned, Duration::from_secs(1))
            .poll_every(Duration::ZERO);
        assert_eq!(result.unwrap_err(), ConfigError::ZeroInterval);
    }

    #[test]
    fn test_fallback_schedule() {
        let spec = WaitSpec::new(svc(), Condition::LoadBalancerAssigned, Duration::from_secs(5));
        assert_eq!(spec.effective_schedule().interval(), DEFAULT_POLL_INTERVAL);
    }

    #[tokio::test]
    async fn test_run_wait_attaches_events() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.script(
            svc(),
            vec![Ok(ResourceState::ServiceIngress { ingress: vec![] })],
        );
        provider.set_events(
            svc(),
            vec![WaitEvent {
                reason: "SyncLoadBalancerFailed".to_string(),
                message: "no IP pool".to_string(),
                timestamp: None,
            }],
        );

        let spec = WaitSpec::new(svc(), Condition::LoadBalancerAssigned, Duration::from_millis(100))
            .poll_every(Duration::from_millis(20))
            .unwrap();
        let waiter = PollWaiter::new(provider.clone());

        let err = run_wait(&waiter, provider.as_ref(), &spec, &CancellationToken::new())
            .await
            .unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.events.len(), 1);
        assert!(err.to_string().contains("SyncLoadBalancerFailed"));
        assert!(err.to_string().contains("0 ingress entries"));
    }
}
