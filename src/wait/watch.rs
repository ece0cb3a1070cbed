use super::{WaitOutcome, WaitSpec, Waiter};
use crate::deadline::Deadline;
use crate::predicate::PredicateResult;
use crate::provider::{ProviderError, StateEvent, StateProvider, StateStream};
use crate::resource::ResourceRef;
use crate::state::ResourceState;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Waits by subscribing to the target's change stream
///
/// Every event is checked against the condition as it arrives; no polling
/// delay is added. A subscription that cannot be opened is reported as
/// [`WaitOutcome::TransientError`] without retrying: resubscription is the
/// caller's decision.
pub struct WatchWaiter {
    provider: Arc<dyn StateProvider>,
}

impl WatchWaiter {
    pub fn new(provider: Arc<dyn StateProvider>) -> Self {
        Self { provider }
    }
}

/// An open change stream; dropping it releases the server-side watch
struct Subscription<'a> {
    target: &'a ResourceRef,
    stream: StateStream,
    opened: Instant,
    events: usize,
}

impl<'a> Subscription<'a> {
    fn new(target: &'a ResourceRef, stream: StateStream) -> Self {
        debug!(resource = %target, "watch subscription opened");
        Self {
            target,
            stream,
            opened: Instant::now(),
            events: 0,
        }
    }
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        debug!(
            resource = %self.target,
            events = self.events,
            open_for = ?self.opened.elapsed(),
            "watch subscription released"
        );
    }
}

#[async_trait]
impl Waiter for WatchWaiter {
    async fn wait(&self, spec: &WaitSpec, deadline: &Deadline) -> WaitOutcome {
        let target = &spec.target;
        if let Some(cause) = deadline.cause() {
            return WaitOutcome::TimedOut {
                cause: cause.into(),
                last_state: None,
            };
        }

        let stream = tokio::select! {
            biased;
            opened = self.provider.watch(target) => match opened {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(resource = %target, error = %e, "failed to open watch");
                    return WaitOutcome::TransientError(e);
                }
            },
            cause = deadline.done() => {
                return WaitOutcome::TimedOut { cause: cause.into(), last_state: None };
            }
        };

        let mut subscription = Subscription::new(target, stream);
        let mut last_state: Option<ResourceState> = None;

        loop {
            // A fully received event wins over a deadline that fires at the same time
            let next = tokio::select! {
                biased;
                next = subscription.stream.next() => next,
                cause = deadline.done() => {
                    return WaitOutcome::TimedOut { cause: cause.into(), last_state };
                }
            };

            match next {
                None => {
                    return WaitOutcome::TransientError(ProviderError::Subscription(format!(
                        "watch on {} ended",
                        target.short()
                    )));
                }
                Some(Err(e)) if e.is_terminal() => {
                    warn!(resource = %target, error = %e, "watch failed");
                    return WaitOutcome::TransientError(e);
                }
                Some(Err(e)) => {
                    warn!(resource = %target, error = %e, "watch error, waiting for next event");
                }
                Some(Ok(StateEvent::Applied(state))) => {
                    subscription.events += 1;
                    match spec.condition.evaluate(&state) {
                        PredicateResult::Satisfied => return WaitOutcome::Satisfied(state),
                        PredicateResult::PermanentFailure(reason) => {
                            return WaitOutcome::PermanentFailure {
                                reason,
                                state: Some(state),
                            };
                        }
                        PredicateResult::NotYet => {
                            debug!(resource = %target, state = %state, "not ready yet");
                            last_state = Some(state);
                        }
                    }
                }
                Some(Ok(StateEvent::Deleted)) => {
                    subscription.events += 1;
                    match spec.condition.on_deleted() {
                        PredicateResult::PermanentFailure(reason) => {
                            return WaitOutcome::PermanentFailure {
                                reason,
                                state: last_state,
                            };
                        }
                        PredicateResult::Satisfied | PredicateResult::NotYet => {
                            debug!(resource = %target, "deleted, waiting for recreation");
                            last_state = None;
                        }
                    }
                }
            }

            // A stream that is always ready would otherwise starve the deadline
            if let Some(cause) = deadline.cause() {
                return WaitOutcome::TimedOut {
                    cause: cause.into(),
                    last_state,
                };
            }
        }
    }
}
