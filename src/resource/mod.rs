//! Target identity for wait operations
//!
//! A [`ResourceRef`] names exactly one object in the cluster (or one external
//! job): its [`ResourceKind`], namespace and name. Every wait failure message is
//! built from it, so its `Display` form is what users see in test output.

mod parsing;

pub use parsing::{parse_resource_ref, ParseError};

use std::fmt;

/// API group served by the VictoriaMetrics operator
pub const VM_OPERATOR_GROUP: &str = "operator.victoriametrics.com";

/// API group served by Chaos Mesh
pub const CHAOS_MESH_GROUP: &str = "chaos-mesh.org";

/// Kinds of resources the harness knows how to wait for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `VMSingle` custom resource
    VMSingle,
    /// `VMAgent` custom resource
    VMAgent,
    /// `VMAlert` custom resource
    VMAlert,
    /// `VMCluster` custom resource
    VMCluster,
    Deployment,
    Service,
    Ingress,
    Job,
    /// Chaos Mesh experiment, identified by its resource type
    /// (e.g. `podchaos`, `networkchaos`)
    Chaos(String),
    /// Job tracked by an external HTTP status endpoint, not by the cluster
    ExternalJob,
}

impl ResourceKind {
    /// Short lowercase name, as used in `kind/name` references
    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::VMSingle => "vmsingle",
            ResourceKind::VMAgent => "vmagent",
            ResourceKind::VMAlert => "vmalert",
            ResourceKind::VMCluster => "vmcluster",
            ResourceKind::Deployment => "deployment",
            ResourceKind::Service => "service",
            ResourceKind::Ingress => "ingress",
            ResourceKind::Job => "job",
            ResourceKind::Chaos(resource) => resource.as_str(),
            ResourceKind::ExternalJob => "externaljob",
        }
    }

    /// Whether this kind is a VictoriaMetrics operator custom resource
    pub fn is_vm_custom_resource(&self) -> bool {
        matches!(
            self,
            ResourceKind::VMSingle
                | ResourceKind::VMAgent
                | ResourceKind::VMAlert
                | ResourceKind::VMCluster
        )
    }

    /// `GroupVersionResource` for kinds read through the dynamic client
    ///
    /// Returns `None` for built-in kinds (which have typed APIs) and for
    /// external jobs.
    pub fn gvr(&self) -> Option<Gvr> {
        match self {
            ResourceKind::VMSingle => Some(Gvr::vm_operator("vmsingles", "VMSingle")),
            ResourceKind::VMAgent => Some(Gvr::vm_operator("vmagents", "VMAgent")),
            ResourceKind::VMAlert => Some(Gvr::vm_operator("vmalerts", "VMAlert")),
            ResourceKind::VMCluster => Some(Gvr::vm_operator("vmclusters", "VMCluster")),
            ResourceKind::Chaos(resource) => Some(Gvr::chaos(resource)),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the object a wait operation targets
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a `kind/name` reference into a target in `namespace`
    ///
    /// # Example
    ///
    /// ```
    /// use vm_e2e::resource::{ResourceKind, ResourceRef};
    ///
    /// let target = ResourceRef::parse("vmsingle/overwatch", "vm").unwrap();
    /// assert_eq!(target.kind, ResourceKind::VMSingle);
    /// assert_eq!(target.to_string(), "vmsingle/overwatch (namespace vm)");
    /// ```
    pub fn parse(reference: &str, namespace: impl Into<String>) -> Result<Self, ParseError> {
        let (kind, name) = parse_resource_ref(reference)?;
        Ok(Self::new(kind, namespace, name))
    }

    /// `kind/name` without the namespace
    pub fn short(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{} (namespace {})", self.kind, self.name, self.namespace)
        }
    }
}

/// `GroupVersionResource` identifies a custom resource type
///
/// Used with the dynamic client for operator and chaos resources that have
/// no typed bindings in this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gvr {
    /// API group (e.g., "operator.victoriametrics.com")
    pub group: String,
    /// API version (e.g., "v1beta1")
    pub version: String,
    /// Resource name (plural, e.g., "vmsingles")
    pub resource: String,
    /// Kind name (singular, e.g., "`VMSingle`")
    pub kind: String,
}

impl Gvr {
    #[must_use]
    pub fn new(group: &str, version: &str, resource: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
            kind: kind.to_string(),
        }
    }

    fn vm_operator(resource: &str, kind: &str) -> Self {
        Self::new(VM_OPERATOR_GROUP, "v1beta1", resource, kind)
    }

    /// Chaos Mesh resources use the lowercase kind as their plural
    fn chaos(resource: &str) -> Self {
        let resource = resource.to_lowercase();
        Self::new(
            CHAOS_MESH_GROUP,
            "v1alpha1",
            &resource,
            &chaos_kind_name(&resource),
        )
    }

    /// Convert to kube `ApiResource`
    pub(crate) fn to_api_resource(&self) -> kube::core::ApiResource {
        kube::core::ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: if self.group.is_empty() {
                self.version.clone()
            } else {
                format!("{}/{}", self.group, self.version)
            },
            kind: self.kind.clone(),
            plural: self.resource.clone(),
        }
    }
}

fn chaos_kind_name(resource: &str) -> String {
    match resource {
        "podchaos" => "PodChaos".to_string(),
        "networkchaos" => "NetworkChaos".to_string(),
        "stresschaos" => "StressChaos".to_string(),
        "iochaos" => "IOChaos".to_string(),
        "timechaos" => "TimeChaos".to_string(),
        "dnschaos" => "DNSChaos".to_string(),
        "httpchaos" => "HTTPChaos".to_string(),
        "kernelchaos" => "KernelChaos".to_string(),
        "schedule" => "Schedule".to_string(),
        "workflow" => "Workflow".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_ref_display() {
        let target = ResourceRef::new(ResourceKind::VMCluster, "vm", "vmks");
        assert_eq!(target.to_string(), "vmcluster/vmks (namespace vm)");
        assert_eq!(target.short(), "vmcluster/vmks");

        let export = ResourceRef::new(ResourceKind::ExternalJob, "", "export-1");
        assert_eq!(export.to_string(), "externaljob/export-1");
    }

    #[test]
    fn test_chaos_kind_display_uses_resource_type() {
        let target = ResourceRef::new(ResourceKind::Chaos("podchaos".into()), "vm", "kill-pod");
        assert_eq!(target.short(), "podchaos/kill-pod");
    }

    #[test]
    fn test_vm_custom_resource_gvr() {
        let gvr = ResourceKind::VMSingle.gvr().expect("vmsingle has a gvr");
        assert_eq!(gvr.group, "operator.victoriametrics.com");
        assert_eq!(gvr.version, "v1beta1");
        assert_eq!(gvr.resource, "vmsingles");
        assert_eq!(gvr.kind, "VMSingle");

        let ar = gvr.to_api_resource();
        assert_eq!(ar.api_version, "operator.victoriametrics.com/v1beta1");
        assert_eq!(ar.plural, "vmsingles");
    }

    #[test]
    fn test_chaos_gvr() {
        let gvr = ResourceKind::Chaos("NetworkChaos".into())
            .gvr()
            .expect("chaos has a gvr");
        assert_eq!(gvr.group, "chaos-mesh.org");
        assert_eq!(gvr.version, "v1alpha1");
        assert_eq!(gvr.resource, "networkchaos");
        assert_eq!(gvr.kind, "NetworkChaos");

        let unknown = ResourceKind::Chaos("blockchaos".into()).gvr().unwrap();
        assert_eq!(unknown.kind, "Blockchaos");
    }

    #[test]
    fn test_builtin_kinds_have_no_gvr() {
        assert!(ResourceKind::Deployment.gvr().is_none());
        assert!(ResourceKind::Service.gvr().is_none());
        assert!(ResourceKind::ExternalJob.gvr().is_none());
    }

    #[test]
    fn test_is_vm_custom_resource() {
        assert!(ResourceKind::VMAgent.is_vm_custom_resource());
        assert!(ResourceKind::VMCluster.is_vm_custom_resource());
        assert!(!ResourceKind::Ingress.is_vm_custom_resource());
        assert!(!ResourceKind::Chaos("podchaos".into()).is_vm_custom_resource());
    }
}
