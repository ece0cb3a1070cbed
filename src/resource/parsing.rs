use super::ResourceKind;

/// Errors from parsing `kind/name` references
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expected 'kind/name', got '{0}'")]
    MissingKind(String),

    #[error("resource name cannot be empty in '{0}'")]
    EmptyName(String),

    #[error("unknown resource kind '{kind}' in '{reference}'")]
    UnknownKind { kind: String, reference: String },
}

/// Parse a resource reference like "vmagent/vmks" into (kind, name)
///
/// Supports kubectl-style aliases for built-in kinds:
/// - `deployment`, `deploy` → Deployment
/// - `service`, `svc` → Service
/// - `ingress`, `ing` → Ingress
/// - `job` → Job
///
/// Operator kinds are `vmsingle`, `vmagent`, `vmalert`, `vmcluster`. Any kind
/// ending in `chaos` (e.g. `podchaos`) is treated as a Chaos Mesh resource.
pub fn parse_resource_ref(reference: &str) -> Result<(ResourceKind, &str), ParseError> {
    let Some((kind_str, name)) = reference.split_once('/') else {
        return Err(ParseError::MissingKind(reference.to_string()));
    };

    if name.is_empty() {
        return Err(ParseError::EmptyName(reference.to_string()));
    }

    let kind = match kind_str.to_lowercase().as_str() {
        "vmsingle" => ResourceKind::VMSingle,
        "vmagent" => ResourceKind::VMAgent,
        "vmalert" => ResourceKind::VMAlert,
        "vmcluster" => ResourceKind::VMCluster,
        "deployment" | "deploy" => ResourceKind::Deployment,
        "service" | "svc" => ResourceKind::Service,
        "ingress" | "ing" => ResourceKind::Ingress,
        "job" => ResourceKind::Job,
        chaos if chaos.ends_with("chaos") => ResourceKind::Chaos(chaos.to_string()),
        _ => {
            return Err(ParseError::UnknownKind {
                kind: kind_str.to_string(),
                reference: reference.to_string(),
            })
        }
    };

    Ok((kind, name))
}
