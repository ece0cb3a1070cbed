//! Readiness predicates
//!
//! A [`Condition`] inspects one [`ResourceState`] snapshot and decides whether
//! the wait is over. Evaluation is pure, so the same condition can drive both
//! the watch-based and the poll-based waiter.

use crate::resource::ResourceKind;
use crate::state::{JobPhase, ResourceState};

/// Terminal-success value of operator `status.updateStatus`
pub const OPERATIONAL: &str = "Operational";

/// Alternative terminal-success value reported by `VMCluster` after scaling
pub const EXPAND_SUCCESS: &str = "ExpandSuccess";

/// Condition type Chaos Mesh sets once every injected fault is recovered
pub const ALL_RECOVERED: &str = "AllRecovered";

/// Result of applying a [`Condition`] to a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateResult {
    Satisfied,
    NotYet,
    /// The resource reached a state it can never leave; carries the
    /// status value that triggered it
    PermanentFailure(String),
}

/// What "ready" means for a wait operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Operator `updateStatus` equals `Operational`, or optionally
    /// `ExpandSuccess`
    OperationalStatus { accept_expand_success: bool },
    /// At least one load-balancer ingress entry has a non-empty IP
    LoadBalancerAssigned,
    /// The job finished successfully
    JobSucceeded,
    /// A status condition of the given type is `True`
    ConditionTrue { condition_type: String },
    /// The Deployment reports `Available` with all replicas ready
    DeploymentAvailable,
}

impl Condition {
    pub fn operational() -> Self {
        Condition::OperationalStatus {
            accept_expand_success: false,
        }
    }

    /// `Operational` or `ExpandSuccess`, as reported by `VMCluster`
    pub fn operational_or_expanded() -> Self {
        Condition::OperationalStatus {
            accept_expand_success: true,
        }
    }

    /// Chaos experiment has recovered every injected fault
    pub fn chaos_recovered() -> Self {
        Self::condition_true(ALL_RECOVERED)
    }

    pub fn condition_true(condition_type: impl Into<String>) -> Self {
        Condition::ConditionTrue {
            condition_type: condition_type.into(),
        }
    }

    /// Default readiness condition for a resource kind
    pub fn for_kind(kind: &ResourceKind) -> Self {
        match kind {
            ResourceKind::VMCluster => Self::operational_or_expanded(),
            ResourceKind::VMSingle | ResourceKind::VMAgent | ResourceKind::VMAlert => {
                Self::operational()
            }
            ResourceKind::Deployment => Condition::DeploymentAvailable,
            ResourceKind::Service | ResourceKind::Ingress => Condition::LoadBalancerAssigned,
            ResourceKind::Job | ResourceKind::ExternalJob => Condition::JobSucceeded,
            ResourceKind::Chaos(_) => Self::chaos_recovered(),
        }
    }

    /// Description used in logs and failure reports
    pub fn describe(&self) -> String {
        match self {
            Condition::OperationalStatus {
                accept_expand_success: false,
            } => format!("updateStatus is {OPERATIONAL}"),
            Condition::OperationalStatus {
                accept_expand_success: true,
            } => format!("updateStatus is {OPERATIONAL} or {EXPAND_SUCCESS}"),
            Condition::LoadBalancerAssigned => "load balancer IP assigned".to_string(),
            Condition::JobSucceeded => "job succeeded".to_string(),
            Condition::ConditionTrue { condition_type } => {
                format!("condition {condition_type} is True")
            }
            Condition::DeploymentAvailable => "deployment available".to_string(),
        }
    }

    /// Apply the condition to a snapshot
    ///
    /// A snapshot of the wrong shape for this condition is a permanent
    /// failure: no later snapshot of the same resource can change its shape.
    pub fn evaluate(&self, state: &ResourceState) -> PredicateResult {
        match (self, state) {
            (
                Condition::OperationalStatus {
                    accept_expand_success,
                },
                ResourceState::CustomResourceStatus { update_status, .. },
            ) => {
                let status = update_status.as_str();
                if status.eq_ignore_ascii_case(OPERATIONAL)
                    || (*accept_expand_success && status.eq_ignore_ascii_case(EXPAND_SUCCESS))
                {
                    PredicateResult::Satisfied
                } else {
                    PredicateResult::NotYet
                }
            }
            (Condition::LoadBalancerAssigned, ResourceState::ServiceIngress { ingress }) => {
                if ingress.iter().any(|entry| entry.assigned_ip().is_some()) {
                    PredicateResult::Satisfied
                } else {
                    PredicateResult::NotYet
                }
            }
            (Condition::JobSucceeded, ResourceState::JobCompletion(phase)) => match phase {
                JobPhase::Succeeded { .. } => PredicateResult::Satisfied,
                JobPhase::Failed { reason } => {
                    PredicateResult::PermanentFailure(format!("job failed: {reason}"))
                }
                JobPhase::Running { .. } => PredicateResult::NotYet,
            },
            (
                Condition::ConditionTrue { condition_type },
                ResourceState::ChaosConditionList { conditions },
            ) => {
                let matched = conditions.as_ref().is_some_and(|cs| {
                    cs.iter()
                        .any(|c| &c.type_ == condition_type && c.is_true())
                });
                if matched {
                    PredicateResult::Satisfied
                } else {
                    PredicateResult::NotYet
                }
            }
            (
                Condition::DeploymentAvailable,
                ResourceState::DeploymentAvailability {
                    desired,
                    ready,
                    available,
                },
            ) => {
                if *available && ready >= desired {
                    PredicateResult::Satisfied
                } else {
                    PredicateResult::NotYet
                }
            }
            (condition, state) => PredicateResult::PermanentFailure(format!(
                "cannot evaluate '{}' against a {} snapshot",
                condition.describe(),
                state.kind_name()
            )),
        }
    }

    /// Result when the watched resource is deleted
    ///
    /// Condition lists are filled in by a controller that may recreate the
    /// object, so deletion only means "not yet" for them. For everything else
    /// a deleted target can never become ready.
    pub fn on_deleted(&self) -> PredicateResult {
        match self {
            Condition::ConditionTrue { .. } => PredicateResult::NotYet,
            _ => PredicateResult::PermanentFailure("resource was deleted".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{LoadBalancerIngress, StatusCondition};

    fn cr_status(status: &str) -> ResourceState {
        ResourceState::CustomResourceStatus {
            update_status: status.to_string(),
            reason: None,
        }
    }

    fn ingress(entries: Vec<LoadBalancerIngress>) -> ResourceState {
        ResourceState::ServiceIngress { ingress: entries }
    }

    fn conditions(list: Option<Vec<StatusCondition>>) -> ResourceState {
        ResourceState::ChaosConditionList { conditions: list }
    }

    #[test]
    fn test_operational_status() {
        let cond = Condition::operational();
        assert_eq!(cond.evaluate(&cr_status("Operational")), PredicateResult::Satisfied);
        assert_eq!(cond.evaluate(&cr_status("Expanding")), PredicateResult::NotYet);
        assert_eq!(cond.evaluate(&cr_status("")), PredicateResult::NotYet);
        assert_eq!(cond.evaluate(&cr_status("Failed")), PredicateResult::NotYet);
        // Only VMCluster treats ExpandSuccess as done
        assert_eq!(cond.evaluate(&cr_status("ExpandSuccess")), PredicateResult::NotYet);
    }

    #[test]
    fn test_operational_or_expanded() {
        let cond = Condition::operational_or_expanded();
        assert_eq!(cond.evaluate(&cr_status("Operational")), PredicateResult::Satisfied);
        assert_eq!(cond.evaluate(&cr_status("ExpandSuccess")), PredicateResult::Satisfied);
        assert_eq!(cond.evaluate(&cr_status("Expanding")), PredicateResult::NotYet);
        assert_eq!(cond.evaluate(&cr_status("")), PredicateResult::NotYet);
        assert_eq!(cond.evaluate(&cr_status("Failed")), PredicateResult::NotYet);
    }

    #[test]
    fn test_operational_status_matches_operator_casing() {
        // The operator itself reports lowercase values
        let cond = Condition::operational();
        assert_eq!(cond.evaluate(&cr_status("operational")), PredicateResult::Satisfied);
        assert_eq!(cond.evaluate(&cr_status("expanding")), PredicateResult::NotYet);
    }

    #[test]
    fn test_load_balancer_assigned() {
        let cond = Condition::LoadBalancerAssigned;
        assert_eq!(cond.evaluate(&ingress(vec![])), PredicateResult::NotYet);
        assert_eq!(
            cond.evaluate(&ingress(vec![LoadBalancerIngress::ip("")])),
            PredicateResult::NotYet
        );
        assert_eq!(
            cond.evaluate(&ingress(vec![LoadBalancerIngress::default()])),
            PredicateResult::NotYet
        );
        assert_eq!(
            cond.evaluate(&ingress(vec![LoadBalancerIngress::ip("10.0.0.5")])),
            PredicateResult::Satisfied
        );
        assert_eq!(
            cond.evaluate(&ingress(vec![
                LoadBalancerIngress::ip(""),
                LoadBalancerIngress::ip("10.0.0.6")
            ])),
            PredicateResult::Satisfied
        );
    }

    #[test]
    fn test_chaos_recovered() {
        let cond = Condition::chaos_recovered();
        assert_eq!(
            cond.evaluate(&conditions(Some(vec![StatusCondition::new("AllRecovered", "True")]))),
            PredicateResult::Satisfied
        );
        assert_eq!(
            cond.evaluate(&conditions(Some(vec![StatusCondition::new("AllRecovered", "False")]))),
            PredicateResult::NotYet
        );
        assert_eq!(cond.evaluate(&conditions(Some(vec![]))), PredicateResult::NotYet);
        assert_eq!(cond.evaluate(&conditions(None)), PredicateResult::NotYet);
        assert_eq!(
            cond.evaluate(&conditions(Some(vec![StatusCondition::new("AllInjected", "True")]))),
            PredicateResult::NotYet
        );
    }

    #[test]
    fn test_job_succeeded() {
        let cond = Condition::JobSucceeded;
        assert_eq!(
            cond.evaluate(&ResourceState::JobCompletion(JobPhase::Succeeded { artifact: None })),
            PredicateResult::Satisfied
        );
        assert_eq!(
            cond.evaluate(&ResourceState::JobCompletion(JobPhase::Running {
                state: "running".to_string()
            })),
            PredicateResult::NotYet
        );
        assert_eq!(
            cond.evaluate(&ResourceState::JobCompletion(JobPhase::Failed {
                reason: "BackoffLimitExceeded".to_string()
            })),
            PredicateResult::PermanentFailure("job failed: BackoffLimitExceeded".to_string())
        );
    }

    #[test]
    fn test_deployment_available() {
        let cond = Condition::DeploymentAvailable;
        let state = |ready, available| ResourceState::DeploymentAvailability {
            desired: 2,
            ready,
            available,
        };
        assert_eq!(cond.evaluate(&state(2, true)), PredicateResult::Satisfied);
        assert_eq!(cond.evaluate(&state(1, true)), PredicateResult::NotYet);
        assert_eq!(cond.evaluate(&state(2, false)), PredicateResult::NotYet);
    }

    #[test]
    fn test_mismatched_snapshot_is_permanent() {
        let result = Condition::operational().evaluate(&ingress(vec![]));
        match result {
            PredicateResult::PermanentFailure(reason) => {
                assert!(reason.contains("load balancer ingress"));
            }
            other => panic!("expected PermanentFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_on_deleted() {
        assert_eq!(Condition::chaos_recovered().on_deleted(), PredicateResult::NotYet);
        assert!(matches!(
            Condition::operational().on_deleted(),
            PredicateResult::PermanentFailure(_)
        ));
    }

    #[test]
    fn test_for_kind() {
        assert_eq!(
            Condition::for_kind(&ResourceKind::VMCluster),
            Condition::operational_or_expanded()
        );
        assert_eq!(Condition::for_kind(&ResourceKind::VMAgent), Condition::operational());
        assert_eq!(
            Condition::for_kind(&ResourceKind::Chaos("podchaos".into())),
            Condition::chaos_recovered()
        );
        assert_eq!(
            Condition::for_kind(&ResourceKind::Ingress),
            Condition::LoadBalancerAssigned
        );
    }
}
