//! Sources of resource state
//!
//! Waiters never talk to the cluster directly. They consume:
//! - [`StateProvider`]: fetch one snapshot, or subscribe to changes of one
//!   resource
//! - [`JobStatusProvider`]: ask whether a job has finished
//!
//! Implementations:
//! - [`KubeProvider`]: Kubernetes API via `kube`
//! - [`HttpJobStatusProvider`]: exporter job status over HTTP
//! - [`ScriptedProvider`]: in-memory replay of scripted snapshots for tests

use crate::resource::{ResourceKind, ResourceRef};
use crate::state::{JobPhase, ResourceState};
use crate::wait::WaitEvent;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

mod http;
mod k8s;
mod scripted;

pub use self::http::HttpJobStatusProvider;
pub use self::k8s::KubeProvider;
pub use self::scripted::ScriptedProvider;

/// Error type for provider operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("resource type {0} is not served by the cluster")]
    ResourceTypeNotFound(String),

    #[error("{0}: permission denied (check RBAC)")]
    Forbidden(String),

    #[error("{0}: cannot reach API")]
    Unavailable(String),

    #[error("failed to decode {0}")]
    Decode(String),

    #[error("watch subscription failed: {0}")]
    Subscription(String),

    #[error("Kubernetes API error: {0}")]
    Kube(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl ProviderError {
    /// Errors that retrying cannot fix
    ///
    /// Poll loops escalate these immediately instead of waiting out the
    /// deadline.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProviderError::ResourceTypeNotFound(_)
                | ProviderError::Forbidden(_)
                | ProviderError::Decode(_)
                | ProviderError::Unsupported(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

/// One change observed on a watched resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// Created, updated, or listed during (re)subscription
    Applied(ResourceState),
    Deleted,
}

/// Change stream for one resource; dropping it ends the subscription
pub type StateStream = BoxStream<'static, Result<StateEvent, ProviderError>>;

/// Read access to resource state
#[async_trait]
pub trait StateProvider: Send + Sync {
    /// Fetch the current state of `target`
    async fn get(&self, target: &ResourceRef) -> Result<ResourceState, ProviderError>;

    /// Subscribe to changes of `target`
    ///
    /// Fails if the subscription cannot be opened. Implementations scope the
    /// subscription to the target's name.
    async fn watch(&self, target: &ResourceRef) -> Result<StateStream, ProviderError>;

    /// Recent events about `target`, oldest first, for failure reports
    async fn recent_events(&self, _target: &ResourceRef) -> Vec<WaitEvent> {
        Vec::new()
    }
}

/// Status of Kubernetes Jobs or external jobs
#[async_trait]
pub trait JobStatusProvider: Send + Sync {
    async fn job_status(&self, namespace: &str, job: &str) -> Result<JobPhase, ProviderError>;

    async fn is_job_succeeded(&self, namespace: &str, job: &str) -> Result<bool, ProviderError> {
        Ok(matches!(
            self.job_status(namespace, job).await?,
            JobPhase::Succeeded { .. }
        ))
    }
}

/// Presents a [`JobStatusProvider`] as a poll-only [`StateProvider`]
///
/// Every `get` asks the job provider and wraps the phase in a
/// [`ResourceState::JobCompletion`] snapshot.
pub struct JobStates {
    jobs: Arc<dyn JobStatusProvider>,
}

impl JobStates {
    pub fn new(jobs: Arc<dyn JobStatusProvider>) -> Self {
        Self { jobs }
    }
}

#[async_trait]
impl StateProvider for JobStates {
    async fn get(&self, target: &ResourceRef) -> Result<ResourceState, ProviderError> {
        match target.kind {
            ResourceKind::Job | ResourceKind::ExternalJob => {
                let phase = self.jobs.job_status(&target.namespace, &target.name).await?;
                Ok(ResourceState::JobCompletion(phase))
            }
            _ => Err(ProviderError::Unsupported(format!(
                "job status provider cannot read {}",
                target.short()
            ))),
        }
    }

    async fn watch(&self, target: &ResourceRef) -> Result<StateStream, ProviderError> {
        Err(ProviderError::Unsupported(format!(
            "job status for {} can only be polled",
            target.short()
        )))
    }
}
