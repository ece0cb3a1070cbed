//! vm-e2e - readiness waiting for VictoriaMetrics end-to-end tests
//!
//! Blocks until asynchronously reconciled resources (operator custom
//! resources, Deployments, Services, Ingresses, Jobs, chaos experiments,
//! external export jobs) reach a ready state, under a hard deadline and
//! without busy-waiting.
//!
//! - [`predicate`]: is this snapshot ready, not yet, or never going to be?
//! - [`wait`]: watch- and poll-based waiters racing a [`deadline`]
//! - [`provider`]: where snapshots come from (Kubernetes, HTTP, scripted)
//! - [`rollout`]: ordered multi-stage waits, stopping at the first failure
//! - [`harness`]: the entry points tests call
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use vm_e2e::{Harness, HarnessConfig, RequireExt, ResourceKind, TracingReporter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     vm_e2e::telemetry::init_logging();
//!
//!     let harness = Harness::connect(HarnessConfig::from_env()?).await?;
//!     let t = TracingReporter::new("vmsingle_operational");
//!
//!     harness
//!         .wait_until_operational(ResourceKind::VMSingle, "vm", "overwatch", Duration::from_secs(600))
//!         .await
//!         .require(&t);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod deadline;
pub mod diagnostics;
pub mod harness;
pub mod predicate;
pub mod provider;
pub mod resource;
pub mod rollout;
pub mod state;
pub mod telemetry;
pub mod wait;

// Re-export commonly used types
pub use config::{ConfigError, HarnessConfig, Timeouts};
pub use deadline::{Deadline, DeadlineCause};
pub use diagnostics::FailureSummary;
pub use harness::{Harness, RequireExt, TestReporter, TracingReporter};
pub use predicate::{Condition, PredicateResult};
pub use provider::{
    HttpJobStatusProvider, JobStatusProvider, KubeProvider, ProviderError, ScriptedProvider,
    StateProvider,
};
pub use resource::{ResourceKind, ResourceRef};
pub use rollout::{Rollout, RolloutError, RolloutReport, Stage, Strategy};
pub use state::{JobPhase, ResourceState};
pub use wait::{retry_budget, PollSchedule, WaitError, WaitOutcome, WaitSpec};
