//! Multi-stage readiness
//!
//! A [`Rollout`] is an ordered list of waits modelling physical dependency
//! order: a Deployment must be available before the custom resource it backs
//! can become operational, which must happen before its ingress gets an IP.
//! Stages run strictly one after another and the first failure aborts the
//! rest.
//!
//! # Example
//!
//! ```ignore
//! let rollout = Rollout::new()
//!     .watch("operator available", WaitSpec::new(operator, Condition::DeploymentAvailable, timeout))
//!     .watch("vmsingle operational", WaitSpec::new(vmsingle, Condition::operational(), timeout))
//!     .poll("ingress assigned", WaitSpec::new(ingress, Condition::LoadBalancerAssigned, timeout));
//!
//! let report = rollout.run(provider, &suite_token).await?;
//! println!("rollout finished in {:?}", report.total_elapsed());
//! ```

use crate::provider::StateProvider;
use crate::resource::ResourceRef;
use crate::state::ResourceState;
use crate::wait::{run_wait, PollWaiter, WaitError, WaitSpec, Waiter, WatchWaiter};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How a stage observes its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Watch,
    Poll,
}

/// One mandatory step of a rollout
#[derive(Clone)]
pub struct Stage {
    pub label: String,
    pub spec: WaitSpec,
    pub strategy: Strategy,
    /// Provider used instead of the rollout's (e.g. a job status endpoint)
    provider: Option<Arc<dyn StateProvider>>,
}

impl Stage {
    pub fn new(label: impl Into<String>, spec: WaitSpec, strategy: Strategy) -> Self {
        Self {
            label: label.into(),
            spec,
            strategy,
            provider: None,
        }
    }

    /// Observe this stage through `provider` instead of the rollout's
    pub fn with_provider(mut self, provider: Arc<dyn StateProvider>) -> Self {
        self.provider = Some(provider);
        self
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("label", &self.label)
            .field("spec", &self.spec)
            .field("strategy", &self.strategy)
            .field("custom_provider", &self.provider.is_some())
            .finish()
    }
}

/// Ordered list of stages
#[derive(Debug, Clone, Default)]
pub struct Rollout {
    stages: Vec<Stage>,
}

/// Result of one satisfied stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub label: String,
    pub resource: ResourceRef,
    pub elapsed: Duration,
    pub state: ResourceState,
}

/// All stages succeeded
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RolloutReport {
    pub stages: Vec<StageReport>,
}

impl RolloutReport {
    pub fn total_elapsed(&self) -> Duration {
        self.stages.iter().map(|s| s.elapsed).sum()
    }
}

/// Stage `index` (1-based) failed; earlier stages are in `completed`
#[derive(Debug, thiserror::Error)]
#[error("stage {index} ({label}) failed: {source}")]
pub struct RolloutError {
    pub index: usize,
    pub label: String,
    pub completed: Vec<StageReport>,
    #[source]
    pub source: WaitError,
}

impl Rollout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Add a stage that watches its resource
    pub fn watch(self, label: impl Into<String>, spec: WaitSpec) -> Self {
        self.stage(Stage::new(label, spec, Strategy::Watch))
    }

    /// Add a stage that polls its resource
    pub fn poll(self, label: impl Into<String>, spec: WaitSpec) -> Self {
        self.stage(Stage::new(label, spec, Strategy::Poll))
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order, stopping at the first failure
    pub async fn run(
        &self,
        provider: Arc<dyn StateProvider>,
        cancel: &CancellationToken,
    ) -> Result<RolloutReport, RolloutError> {
        let mut completed = Vec::with_capacity(self.stages.len());

        for (i, stage) in self.stages.iter().enumerate() {
            let index = i + 1;
            let source = stage.provider.clone().unwrap_or_else(|| provider.clone());
            let waiter: Box<dyn Waiter> = match stage.strategy {
                Strategy::Watch => Box::new(WatchWaiter::new(source.clone())),
                Strategy::Poll => Box::new(PollWaiter::new(source.clone())),
            };

            info!(
                stage = index,
                total = self.stages.len(),
                label = %stage.label,
                resource = %stage.spec.target,
                timeout = ?stage.spec.timeout,
                "starting stage"
            );

            let start = Instant::now();
            match run_wait(waiter.as_ref(), source.as_ref(), &stage.spec, cancel).await {
                Ok(state) => completed.push(StageReport {
                    label: stage.label.clone(),
                    resource: stage.spec.target.clone(),
                    elapsed: start.elapsed(),
                    state,
                }),
                Err(error) => {
                    warn!(stage = index, label = %stage.label, "stage failed, aborting rollout");
                    return Err(RolloutError {
                        index,
                        label: stage.label.clone(),
                        completed,
                        source: error,
                    });
                }
            }
        }

        Ok(RolloutReport { stages: completed })
    }
}
