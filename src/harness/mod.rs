//! Entry points used by installers and tests
//!
//! [`Harness`] bundles the configuration, the providers, and the suite's
//! cancellation token, and picks the condition and strategy for each kind of
//! wait:
//!
//! | Entry point | Condition | Strategy |
//! |---|---|---|
//! | [`wait_until_operational`](Harness::wait_until_operational) | status `Operational` | watch |
//! | [`wait_until_deployment_available`](Harness::wait_until_deployment_available) | Deployment available | watch |
//! | [`wait_until_load_balancer_assigned`](Harness::wait_until_load_balancer_assigned) | Service has an IP | poll |
//! | [`wait_until_ingress_available`](Harness::wait_until_ingress_available) | Ingress has an IP | poll |
//! | [`wait_until_job_succeeded`](Harness::wait_until_job_succeeded) | job succeeded | poll |
//! | [`wait_until_condition_true`](Harness::wait_until_condition_true) | `status.conditions` entry is `True` | poll |
//! | [`wait_until_export_completed`](Harness::wait_until_export_completed) | export job succeeded | poll |
//!
//! Every entry point returns a `Result`; tests turn failures into a failed
//! test with [`RequireExt::require`].
//!
//! # Example
//!
//! ```ignore
//! let harness = Harness::connect(HarnessConfig::from_env()?).await?;
//! let t = TracingReporter::new("vmsingle_smoke");
//!
//! harness
//!     .wait_until_operational(ResourceKind::VMSingle, "vm", "overwatch", Duration::from_secs(600))
//!     .await
//!     .require(&t);
//! ```

mod reporter;

pub use reporter::{Failure, RequireExt, TestReporter, TracingReporter};

use crate::config::HarnessConfig;
use crate::predicate::Condition;
use crate::provider::{JobStates, JobStatusProvider, KubeProvider, ProviderError, StateProvider};
use crate::resource::{ResourceKind, ResourceRef};
use crate::rollout::{Rollout, RolloutError, RolloutReport};
use crate::state::{JobPhase, LoadBalancerIngress, ResourceState};
use crate::wait::{run_wait, PollWaiter, WaitError, WaitReport, WaitSpec, WatchWaiter};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Address used for the ingress controller on local kind clusters
pub const KIND_INGRESS_HOST: &str = "127.0.0.1";

/// Readiness waits for one test suite
#[derive(Clone)]
pub struct Harness {
    config: Arc<HarnessConfig>,
    provider: Arc<dyn StateProvider>,
    jobs: Arc<dyn JobStatusProvider>,
    cancel: CancellationToken,
}

impl Harness {
    pub fn new(
        config: Arc<HarnessConfig>,
        provider: Arc<dyn StateProvider>,
        jobs: Arc<dyn JobStatusProvider>,
    ) -> Self {
        Self {
            config,
            provider,
            jobs,
            cancel: CancellationToken::new(),
        }
    }

    /// Connect to the cluster from the ambient kubeconfig
    pub async fn connect(config: HarnessConfig) -> Result<Self, ProviderError> {
        let kube = Arc::new(KubeProvider::try_default().await?);
        Ok(Self::new(Arc::new(config), kube.clone(), kube))
    }

    /// Derive every wait from `token` so cancelling it aborts them all
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Cancel this to abort every in-flight wait
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    async fn watch(&self, spec: WaitSpec) -> Result<ResourceState, WaitError> {
        let waiter = WatchWaiter::new(self.provider.clone());
        run_wait(&waiter, self.provider.as_ref(), &spec, &self.cancel).await
    }

    async fn poll(
        &self,
        provider: Arc<dyn StateProvider>,
        spec: WaitSpec,
    ) -> Result<ResourceState, WaitError> {
        let waiter = PollWaiter::new(provider.clone());
        run_wait(&waiter, provider.as_ref(), &spec, &self.cancel).await
    }

    /// Poll spec whose interval never exceeds the timeout
    fn poll_spec(
        target: ResourceRef,
        condition: Condition,
        timeout: Duration,
        interval: Duration,
    ) -> Result<WaitSpec, WaitError> {
        let interval = if timeout.is_zero() {
            interval
        } else {
            interval.min(timeout)
        };
        Ok(WaitSpec::new(target, condition, timeout).poll_every(interval)?)
    }

    fn job_states(&self) -> Arc<dyn StateProvider> {
        Arc::new(JobStates::new(self.jobs.clone()))
    }

    /// Wait until an operator custom resource reports `Operational`
    ///
    /// `VMCluster` also accepts `ExpandSuccess`. A resource stuck in an error
    /// status only ever times out.
    pub async fn wait_until_operational(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<ResourceState, WaitError> {
        let condition = Condition::for_kind(&kind);
        let target = ResourceRef::new(kind, namespace, name);
        self.watch(WaitSpec::new(target, condition, timeout)).await
    }

    pub async fn wait_until_deployment_available(
        &self,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<ResourceState, WaitError> {
        let target = ResourceRef::new(ResourceKind::Deployment, namespace, name);
        self.watch(WaitSpec::new(target, Condition::DeploymentAvailable, timeout))
            .await
    }

    /// Wait until a Service has a load-balancer ingress with an IP
    pub async fn wait_until_load_balancer_assigned(
        &self,
        namespace: &str,
        service: &str,
        timeout: Duration,
    ) -> Result<ResourceState, WaitError> {
        let target = ResourceRef::new(ResourceKind::Service, namespace, service);
        let spec = Self::poll_spec(
            target,
            Condition::LoadBalancerAssigned,
            timeout,
            self.config.timeouts.polling_interval,
        )?;
        self.poll(self.provider.clone(), spec).await
    }

    /// Wait until an Ingress has a load-balancer ingress with an IP
    pub async fn wait_until_ingress_available(
        &self,
        namespace: &str,
        ingress: &str,
        timeout: Duration,
    ) -> Result<ResourceState, WaitError> {
        let target = ResourceRef::new(ResourceKind::Ingress, namespace, ingress);
        let spec = Self::poll_spec(
            target,
            Condition::LoadBalancerAssigned,
            timeout,
            self.config.timeouts.polling_interval,
        )?;
        self.poll(self.provider.clone(), spec).await
    }

    /// Wait until a job succeeds; a failed job fails the wait immediately
    pub async fn wait_until_job_succeeded(
        &self,
        namespace: &str,
        job: &str,
        timeout: Duration,
    ) -> Result<ResourceState, WaitError> {
        let target = ResourceRef::new(ResourceKind::Job, namespace, job);
        let spec = Self::poll_spec(
            target,
            Condition::JobSucceeded,
            timeout,
            self.config.timeouts.job_polling_interval,
        )?;
        self.poll(self.job_states(), spec).await
    }

    /// Wait for the `parallelism` jobs `<scenario>-1` .. `<scenario>-N`
    ///
    /// Jobs are awaited one after another under one shared `timeout`.
    pub async fn wait_until_jobs_succeeded(
        &self,
        namespace: &str,
        scenario: &str,
        parallelism: u32,
        timeout: Duration,
    ) -> Result<Vec<ResourceState>, WaitError> {
        let start = Instant::now();
        let mut states = Vec::with_capacity(parallelism as usize);
        for i in 1..=parallelism {
            let job = format!("{scenario}-{i}");
            let remaining = timeout.saturating_sub(start.elapsed());
            states.push(self.wait_until_job_succeeded(namespace, &job, remaining).await?);
        }
        info!(namespace = %namespace, scenario = %scenario, parallelism, elapsed = ?start.elapsed(), "all jobs succeeded");
        Ok(states)
    }

    /// Wait until `status.conditions` holds `condition_type` with status `True`
    ///
    /// Polls rather than watches. A resource that does not exist yet is
    /// treated as not ready, since its controller may still be creating it.
    pub async fn wait_until_condition_true(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        condition_type: &str,
        timeout: Duration,
    ) -> Result<ResourceState, WaitError> {
        let target = ResourceRef::new(kind, namespace, name);
        let spec = Self::poll_spec(
            target,
            Condition::condition_true(condition_type),
            timeout,
            self.config.timeouts.polling_interval,
        )?;
        self.poll(self.provider.clone(), spec).await
    }

    /// Wait until a chaos experiment reports `AllRecovered`
    ///
    /// Bounded by the configured chaos duration.
    pub async fn wait_until_chaos_recovered(
        &self,
        chaos_type: &str,
        namespace: &str,
        name: &str,
    ) -> Result<ResourceState, WaitError> {
        self.wait_until_condition_true(
            ResourceKind::Chaos(chaos_type.to_lowercase()),
            namespace,
            name,
            crate::predicate::ALL_RECOVERED,
            self.config.timeouts.chaos_max_duration,
        )
        .await
    }

    /// Wait until an external export job completes; returns its archive path
    pub async fn wait_until_export_completed(
        &self,
        exporter: Arc<dyn JobStatusProvider>,
        job_id: &str,
        timeout: Duration,
    ) -> Result<Option<String>, WaitError> {
        let start = Instant::now();
        let target = ResourceRef::new(ResourceKind::ExternalJob, "", job_id);
        let spec = Self::poll_spec(
            target.clone(),
            Condition::JobSucceeded,
            timeout,
            self.config.timeouts.export_poll_interval,
        )?;
        let states: Arc<dyn StateProvider> = Arc::new(JobStates::new(exporter));
        let state = self.poll(states, spec).await?;
        export_artifact(&target, state, timeout, start.elapsed())
    }

    /// Find the public address of the ingress controller
    ///
    /// Waits for the controller Deployment, then for its Service to get a
    /// load-balancer IP. kind clusters never assign one, so there the Service
    /// is read once and [`KIND_INGRESS_HOST`] is used when it has no IP.
    pub async fn discover_ingress_host(
        &self,
        namespace: &str,
        controller: &str,
        timeout: Duration,
    ) -> Result<String, WaitError> {
        let start = Instant::now();
        self.wait_until_deployment_available(namespace, controller, timeout)
            .await?;
        let remaining = timeout.saturating_sub(start.elapsed());

        let state = if self.config.is_kind() {
            let target = ResourceRef::new(ResourceKind::Service, namespace, controller);
            self.provider
                .get(&target)
                .await
                .map_err(|source| WaitError::Transient {
                    resource: target,
                    timeout,
                    elapsed: start.elapsed(),
                    source,
                })?
        } else {
            self.wait_until_load_balancer_assigned(namespace, controller, remaining)
                .await?
        };

        let host = match first_ip(&state) {
            Some(ip) => ip.to_string(),
            None => {
                warn!(namespace = %namespace, service = %controller, "no load balancer IP on kind, using {KIND_INGRESS_HOST}");
                KIND_INGRESS_HOST.to_string()
            }
        };
        info!(namespace = %namespace, host = %host, "discovered ingress host");
        Ok(host)
    }

    /// Run a multi-stage rollout under this harness's cancellation scope
    pub async fn rollout(&self, rollout: &Rollout) -> Result<RolloutReport, RolloutError> {
        rollout.run(self.provider.clone(), &self.cancel).await
    }
}

fn first_ip(state: &ResourceState) -> Option<&str> {
    match state {
        ResourceState::ServiceIngress { ingress } => {
            ingress.iter().find_map(LoadBalancerIngress::assigned_ip)
        }
        _ => None,
    }
}

/// Archive path of a finished export job
///
/// `JobSucceeded` is only satisfied by a succeeded job, so any other state
/// here is reported as a failure rather than an empty archive.
fn export_artifact(
    target: &ResourceRef,
    state: ResourceState,
    timeout: Duration,
    elapsed: Duration,
) -> Result<Option<String>, WaitError> {
    match state {
        ResourceState::JobCompletion(JobPhase::Succeeded { artifact }) => Ok(artifact),
        other => Err(WaitError::PermanentFailure(
            WaitReport::new(target.clone(), Condition::JobSucceeded.describe(), timeout, elapsed)
                .with_reason(format!("export job {} reported no completion", target.name))
                .with_state(Some(other)),
        )),
    }
}
