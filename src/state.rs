//! Typed snapshots of observed resources
//!
//! Providers convert whatever the cluster (or an HTTP endpoint) returns into a
//! [`ResourceState`] at the boundary, so predicates only ever look at typed
//! fields. Snapshots are immutable once captured.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::DynamicObject;
use serde::Deserialize;
use std::fmt;

/// One load-balancer ingress point of a Service or Ingress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadBalancerIngress {
    pub ip: Option<String>,
    pub hostname: Option<String>,
}

impl LoadBalancerIngress {
    pub fn ip(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            hostname: None,
        }
    }

    /// The assigned IP, if it is present and non-empty
    pub fn assigned_ip(&self) -> Option<&str> {
        self.ip.as_deref().filter(|ip| !ip.is_empty())
    }
}

/// A `status.conditions[]` entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StatusCondition {
    pub fn new(type_: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            status: status.into(),
            reason: None,
            message: None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Completion phase of a Kubernetes Job or an external job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    /// Still running; carries the raw state reported by the source
    Running { state: String },
    /// Finished successfully; external jobs may report an artifact location
    Succeeded { artifact: Option<String> },
    /// Finished unsuccessfully
    Failed { reason: String },
}

/// Snapshot of one resource at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// Operator custom resource `status.updateStatus`
    CustomResourceStatus {
        update_status: String,
        reason: Option<String>,
    },
    /// Load-balancer ingress list of a Service or Ingress
    ServiceIngress { ingress: Vec<LoadBalancerIngress> },
    /// Job completion
    JobCompletion(JobPhase),
    /// Condition list of a resource whose status may not exist yet
    ChaosConditionList {
        conditions: Option<Vec<StatusCondition>>,
    },
    /// Deployment availability
    DeploymentAvailability {
        desired: i32,
        ready: i32,
        available: bool,
    },
}

/// Operator status block; only the fields readiness depends on
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperatorStatus {
    #[serde(default)]
    update_status: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConditionedStatus {
    #[serde(default)]
    conditions: Option<Vec<StatusCondition>>,
}

/// Error decoding a dynamic object's status block
#[derive(Debug, thiserror::Error)]
#[error("invalid status block on {name}: {source}")]
pub struct StatusDecodeError {
    pub name: String,
    #[source]
    pub source: serde_json::Error,
}

impl ResourceState {
    /// Short name of the snapshot variant
    pub fn kind_name(&self) -> &'static str {
        match self {
            ResourceState::CustomResourceStatus { .. } => "custom resource status",
            ResourceState::ServiceIngress { .. } => "load balancer ingress",
            ResourceState::JobCompletion(_) => "job completion",
            ResourceState::ChaosConditionList { .. } => "condition list",
            ResourceState::DeploymentAvailability { .. } => "deployment availability",
        }
    }

    /// Read an operator custom resource (`VMSingle`, `VMAgent`, ...) status
    ///
    /// A missing status block or `updateStatus` field yields an empty status,
    /// which no predicate treats as operational.
    pub fn from_operator_object(obj: &DynamicObject) -> Result<Self, StatusDecodeError> {
        let status: OperatorStatus = decode_status(obj)?;
        Ok(ResourceState::CustomResourceStatus {
            update_status: status.update_status.unwrap_or_default(),
            reason: status.reason.filter(|r| !r.is_empty()),
        })
    }

    /// Read `status.conditions` from any object (used for chaos experiments)
    pub fn from_conditioned_object(obj: &DynamicObject) -> Result<Self, StatusDecodeError> {
        let status: Option<ConditionedStatus> = match obj.data.get("status") {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => Some(decode(obj, value)?),
        };
        Ok(ResourceState::ChaosConditionList {
            conditions: status.and_then(|s| s.conditions),
        })
    }

    /// Human-readable description of the snapshot for logs and errors
    pub fn describe(&self) -> String {
        match self {
            ResourceState::CustomResourceStatus {
                update_status,
                reason,
            } => {
                let status = if update_status.is_empty() {
                    "<none>"
                } else {
                    update_status.as_str()
                };
                match reason {
                    Some(reason) => format!("updateStatus={status} (reason: {reason})"),
                    None => format!("updateStatus={status}"),
                }
            }
            ResourceState::ServiceIngress { ingress } => {
                let ips: Vec<&str> = ingress
                    .iter()
                    .filter_map(LoadBalancerIngress::assigned_ip)
                    .collect();
                if ips.is_empty() {
                    format!("{} ingress entries, no IP assigned", ingress.len())
                } else {
                    format!("ingress IPs: {}", ips.join(", "))
                }
            }
            ResourceState::JobCompletion(phase) => match phase {
                JobPhase::Running { state } => format!("job running (state: {state})"),
                JobPhase::Succeeded { artifact: Some(a) } => format!("job succeeded ({a})"),
                JobPhase::Succeeded { artifact: None } => "job succeeded".to_string(),
                JobPhase::Failed { reason } => format!("job failed: {reason}"),
            },
            ResourceState::ChaosConditionList { conditions } => match conditions {
                None => "no status conditions yet".to_string(),
                Some(conditions) if conditions.is_empty() => "empty condition list".to_string(),
                Some(conditions) => conditions
                    .iter()
                    .map(|c| format!("{}={}", c.type_, c.status))
                    .collect::<Vec<_>>()
                    .join(", "),
            },
            ResourceState::DeploymentAvailability {
                desired,
                ready,
                available,
            } => {
                if *available {
                    format!("{ready}/{desired} ready, available")
                } else {
                    format!("{ready}/{desired} ready, not available")
                }
            }
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

fn decode_status<T>(obj: &DynamicObject) -> Result<T, StatusDecodeError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match obj.data.get("status") {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(value) => decode(obj, value),
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    obj: &DynamicObject,
    value: &serde_json::Value,
) -> Result<T, StatusDecodeError> {
    T::deserialize(value).map_err(|source| StatusDecodeError {
        name: obj.metadata.name.clone().unwrap_or_default(),
        source,
    })
}

impl From<&Service> for ResourceState {
    fn from(svc: &Service) -> Self {
        let ingress = svc
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| LoadBalancerIngress {
                        ip: e.ip.clone(),
                        hostname: e.hostname.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        ResourceState::ServiceIngress { ingress }
    }
}

impl From<&Ingress> for ResourceState {
    fn from(ing: &Ingress) -> Self {
        let ingress = ing
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| LoadBalancerIngress {
                        ip: e.ip.clone(),
                        hostname: e.hostname.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        ResourceState::ServiceIngress { ingress }
    }
}

impl From<&Job> for ResourceState {
    fn from(job: &Job) -> Self {
        let status = job.status.as_ref();
        let conditions = status.and_then(|s| s.conditions.as_ref());

        let condition_true = |type_: &str| {
            conditions.and_then(|cs| {
                cs.iter()
                    .find(|c| c.type_ == type_ && c.status == "True")
            })
        };

        if condition_true("Complete").is_some() {
            return ResourceState::JobCompletion(JobPhase::Succeeded { artifact: None });
        }

        if let Some(failed) = condition_true("Failed") {
            let reason = failed
                .message
                .clone()
                .or_else(|| failed.reason.clone())
                .unwrap_or_else(|| "job failed".to_string());
            return ResourceState::JobCompletion(JobPhase::Failed { reason });
        }

        let active = status.and_then(|s| s.active).unwrap_or(0);
        let succeeded = status.and_then(|s| s.succeeded).unwrap_or(0);
        let failed = status.and_then(|s| s.failed).unwrap_or(0);
        ResourceState::JobCompletion(JobPhase::Running {
            state: format!("{active} active, {succeeded} succeeded, {failed} failed"),
        })
    }
}

impl From<&Deployment> for ResourceState {
    fn from(deployment: &Deployment) -> Self {
        let desired = deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1);
        let ready = deployment
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0);
        let available = deployment
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .is_some_and(|cs| {
                cs.iter()
                    .any(|c| c.type_ == "Available" && c.status == "True")
            });

        ResourceState::DeploymentAvailability {
            desired,
            ready,
            available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentSpec, DeploymentStatus};
    use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};
    use k8s_openapi::api::core::v1::{
        LoadBalancerIngress as K8sLoadBalancerIngress, LoadBalancerStatus, ServiceStatus,
    };
    use kube::core::ApiResource;
    use serde_json::json;

    fn dynamic(status: serde_json::Value) -> DynamicObject {
        let ar = ApiResource {
            group: "operator.victoriametrics.com".to_string(),
            version: "v1beta1".to_string(),
            api_version: "operator.victoriametrics.com/v1beta1".to_string(),
            kind: "VMSingle".to_string(),
            plural: "vmsingles".to_string(),
        };
        let mut obj = DynamicObject::new("vmsingle", &ar);
        obj.data = json!({ "status": status });
        obj
    }

    #[test]
    fn test_operator_status_decoding() {
        let obj = dynamic(json!({ "updateStatus": "operational", "reason": "" }));
        let state = ResourceState::from_operator_object(&obj).unwrap();
        assert_eq!(
            state,
            ResourceState::CustomResourceStatus {
                update_status: "operational".to_string(),
                reason: None,
            }
        );
    }

    #[test]
    fn test_operator_status_missing_block() {
        let mut obj = dynamic(json!(null));
        obj.data = json!({});
        let state = ResourceState::from_operator_object(&obj).unwrap();
        assert_eq!(state.describe(), "updateStatus=<none>");
    }

    #[test]
    fn test_operator_status_invalid_block() {
        let obj = dynamic(json!({ "updateStatus": 42 }));
        let err = ResourceState::from_operator_object(&obj).unwrap_err();
        assert!(err.to_string().contains("vmsingle"));
    }

    #[test]
    fn test_conditioned_object_decoding() {
        let obj = dynamic(json!({
            "conditions": [
                { "type": "AllInjected", "status": "True" },
                { "type": "AllRecovered", "status": "False", "reason": "Pending" }
            ]
        }));
        let state = ResourceState::from_conditioned_object(&obj).unwrap();
        let ResourceState::ChaosConditionList {
            conditions: Some(conditions),
        } = state
        else {
            panic!("expected conditions");
        };
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[1].type_, "AllRecovered");
        assert_eq!(conditions[1].reason.as_deref(), Some("Pending"));
    }

    #[test]
    fn test_conditioned_object_without_status() {
        let mut obj = dynamic(json!(null));
        obj.data = json!({ "spec": {} });
        let state = ResourceState::from_conditioned_object(&obj).unwrap();
        assert_eq!(state, ResourceState::ChaosConditionList { conditions: None });
        assert_eq!(state.describe(), "no status conditions yet");
    }

    #[test]
    fn test_service_adapter() {
        let svc = Service {
            status: Some(ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(vec![K8sLoadBalancerIngress {
                        ip: Some("10.0.0.5".to_string()),
                        ..Default::default()
                    }]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let state = ResourceState::from(&svc);
        assert_eq!(
            state,
            ResourceState::ServiceIngress {
                ingress: vec![LoadBalancerIngress::ip("10.0.0.5")]
            }
        );
        assert_eq!(state.describe(), "ingress IPs: 10.0.0.5");
    }

    #[test]
    fn test_service_adapter_without_status() {
        let state = ResourceState::from(&Service::default());
        assert_eq!(state, ResourceState::ServiceIngress { ingress: vec![] });
    }

    #[test]
    fn test_job_adapter_phases() {
        let job_with = |type_: &str, message: Option<&str>| Job {
            status: Some(JobStatus {
                conditions: Some(vec![JobCondition {
                    type_: type_.to_string(),
                    status: "True".to_string(),
                    message: message.map(str::to_string),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(
            ResourceState::from(&job_with("Complete", None)),
            ResourceState::JobCompletion(JobPhase::Succeeded { artifact: None })
        );
        assert_eq!(
            ResourceState::from(&job_with("Failed", Some("BackoffLimitExceeded"))),
            ResourceState::JobCompletion(JobPhase::Failed {
                reason: "BackoffLimitExceeded".to_string()
            })
        );

        let running = Job {
            status: Some(JobStatus {
                active: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            ResourceState::from(&running),
            ResourceState::JobCompletion(JobPhase::Running { .. })
        ));
    }

    #[test]
    fn test_deployment_adapter() {
        let deployment = Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(3),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: Some(1),
                conditions: Some(vec![DeploymentCondition {
                    type_: "Available".to_string(),
                    status: "False".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let state = ResourceState::from(&deployment);
        assert_eq!(
            state,
            ResourceState::DeploymentAvailability {
                desired: 3,
                ready: 1,
                available: false,
            }
        );
        assert_eq!(state.describe(), "1/3 ready, not available");
    }

    #[test]
    fn test_describe_custom_resource_with_reason() {
        let state = ResourceState::CustomResourceStatus {
            update_status: "failed".to_string(),
            reason: Some("cannot create statefulset".to_string()),
        };
        assert_eq!(
            state.describe(),
            "updateStatus=failed (reason: cannot create statefulset)"
        );
    }
}
