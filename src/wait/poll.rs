use super::{TimeoutCause, WaitOutcome, WaitSpec, Waiter};
use crate::deadline::Deadline;
use crate::predicate::PredicateResult;
use crate::provider::StateProvider;
use crate::state::ResourceState;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Waits by re-fetching the target on a fixed interval
///
/// Used where no change stream exists (jobs, external job status, chaos
/// experiments). Bounded by the deadline and by the schedule's retry budget,
/// whichever runs out first. Fetch errors are logged and retried, except
/// terminal ones which end the wait immediately. A missing resource counts
/// as "not yet": its controller may not have created it.
pub struct PollWaiter {
    provider: Arc<dyn StateProvider>,
}

impl PollWaiter {
    pub fn new(provider: Arc<dyn StateProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Waiter for PollWaiter {
    async fn wait(&self, spec: &WaitSpec, deadline: &Deadline) -> WaitOutcome {
        let target = &spec.target;
        let schedule = spec.effective_schedule();
        let max_attempts = schedule.max_attempts();
        let mut attempts: u32 = 0;
        let mut last_state: Option<ResourceState> = None;

        loop {
            if let Some(cause) = deadline.cause() {
                return WaitOutcome::TimedOut {
                    cause: cause.into(),
                    last_state,
                };
            }
            attempts += 1;

            let fetched = tokio::select! {
                biased;
                fetched = self.provider.get(target) => fetched,
                cause = deadline.done() => {
                    return WaitOutcome::TimedOut { cause: cause.into(), last_state };
                }
            };

            match fetched {
                Ok(state) => match spec.condition.evaluate(&state) {
                    PredicateResult::Satisfied => return WaitOutcome::Satisfied(state),
                    PredicateResult::PermanentFailure(reason) => {
                        return WaitOutcome::PermanentFailure {
                            reason,
                            state: Some(state),
                        };
                    }
                    PredicateResult::NotYet => {
                        debug!(
                            resource = %target,
                            attempt = attempts,
                            max_attempts,
                            state = %state,
                            "not ready yet"
                        );
                        last_state = Some(state);
                    }
                },
                Err(e) if e.is_terminal() => {
                    warn!(resource = %target, error = %e, "giving up on unrecoverable error");
                    return WaitOutcome::TransientError(e);
                }
                Err(e) if e.is_not_found() => {
                    debug!(resource = %target, attempt = attempts, "not found yet");
                }
                Err(e) => {
                    warn!(resource = %target, attempt = attempts, error = %e, "fetch failed, retrying");
                }
            }

            if attempts >= max_attempts {
                return WaitOutcome::TimedOut {
                    cause: TimeoutCause::RetriesExhausted { attempts },
                    last_state,
                };
            }

            if let Err(cause) = deadline.sleep(schedule.interval()).await {
                return WaitOutcome::TimedOut {
                    cause: cause.into(),
                    last_state,
                };
            }
        }
    }
}
