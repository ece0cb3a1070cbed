use super::{JobStatusProvider, ProviderError, StateEvent, StateProvider, StateStream};
use crate::resource::{Gvr, ResourceKind, ResourceRef};
use crate::state::{JobPhase, ResourceState, StatusDecodeError};
use crate::wait::WaitEvent;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Event, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DynamicObject, ListParams};
use kube::runtime::watcher;
use kube::runtime::WatchStreamExt;
use kube::Client;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::{debug, warn};

/// Events kept in failure reports
const MAX_EVENTS: usize = 10;

type Convert<K> = fn(&K) -> Result<ResourceState, ProviderError>;

/// Reads resource state from the Kubernetes API
///
/// Built-in kinds use typed APIs; operator and chaos custom resources go
/// through the dynamic client. Watches are scoped to the target's name with a
/// `metadata.name` field selector.
#[derive(Clone)]
pub struct KubeProvider {
    client: Client,
}

impl KubeProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the ambient kubeconfig or in-cluster config
    pub async fn try_default() -> Result<Self, ProviderError> {
        let client = Client::try_default()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("kubeconfig: {e}")))?;
        Ok(Self::new(client))
    }

    fn typed<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = kube::core::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn dynamic(&self, gvr: &Gvr, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &gvr.to_api_resource())
    }

    async fn fetch<K>(
        api: Api<K>,
        target: &ResourceRef,
        convert: Convert<K>,
    ) -> Result<ResourceState, ProviderError>
    where
        K: kube::Resource + Clone + DeserializeOwned + Debug,
    {
        let obj = api
            .get(&target.name)
            .await
            .map_err(|e| classify(target, e))?;
        convert(&obj)
    }

    async fn subscribe<K>(
        api: Api<K>,
        target: &ResourceRef,
        convert: Convert<K>,
    ) -> Result<StateStream, ProviderError>
    where
        K: kube::Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    {
        let selector = format!("metadata.name={}", target.name);

        // The watcher retries failed lists forever, so surface RBAC and
        // missing CRDs before handing it over
        api.list(&ListParams::default().fields(&selector).limit(1))
            .await
            .map_err(|e| classify(target, e))?;

        debug!(resource = %target, "starting watch");

        let stream = watcher::watcher(api, watcher::Config::default().fields(&selector))
            .default_backoff()
            .filter_map(move |event| futures::future::ready(map_event(event, convert)));
        Ok(stream.boxed())
    }
}

#[async_trait]
impl StateProvider for KubeProvider {
    async fn get(&self, target: &ResourceRef) -> Result<ResourceState, ProviderError> {
        let ns = &target.namespace;
        match &target.kind {
            ResourceKind::Deployment => {
                Self::fetch(self.typed::<Deployment>(ns), target, |d| Ok(d.into())).await
            }
            ResourceKind::Service => {
                Self::fetch(self.typed::<Service>(ns), target, |s| Ok(s.into())).await
            }
            ResourceKind::Ingress => {
                Self::fetch(self.typed::<Ingress>(ns), target, |i| Ok(i.into())).await
            }
            ResourceKind::Job => Self::fetch(self.typed::<Job>(ns), target, |j| Ok(j.into())).await,
            kind => {
                let gvr = dynamic_gvr(target)?;
                Self::fetch(self.dynamic(&gvr, ns), target, dynamic_converter(kind)).await
            }
        }
    }

    async fn watch(&self, target: &ResourceRef) -> Result<StateStream, ProviderError> {
        let ns = &target.namespace;
        match &target.kind {
            ResourceKind::Deployment => {
                Self::subscribe(self.typed::<Deployment>(ns), target, |d| Ok(d.into())).await
            }
            ResourceKind::Service => {
                Self::subscribe(self.typed::<Service>(ns), target, |s| Ok(s.into())).await
            }
            ResourceKind::Ingress => {
                Self::subscribe(self.typed::<Ingress>(ns), target, |i| Ok(i.into())).await
            }
            ResourceKind::Job => {
                Self::subscribe(self.typed::<Job>(ns), target, |j| Ok(j.into())).await
            }
            kind => {
                let gvr = dynamic_gvr(target)?;
                Self::subscribe(self.dynamic(&gvr, ns), target, dynamic_converter(kind)).await
            }
        }
    }

    async fn recent_events(&self, target: &ResourceRef) -> Vec<WaitEvent> {
        let api: Api<Event> = self.typed(&target.namespace);
        let params =
            ListParams::default().fields(&format!("involvedObject.name={}", target.name));

        match api.list(&params).await {
            Ok(list) => to_wait_events(list.items),
            Err(e) => {
                warn!(resource = %target, error = %e, "failed to list events");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl JobStatusProvider for KubeProvider {
    async fn job_status(&self, namespace: &str, job: &str) -> Result<JobPhase, ProviderError> {
        let target = ResourceRef::new(ResourceKind::Job, namespace, job);
        match self.get(&target).await? {
            ResourceState::JobCompletion(phase) => Ok(phase),
            other => Err(ProviderError::Decode(format!(
                "{}: expected job completion, got {}",
                target.short(),
                other.kind_name()
            ))),
        }
    }
}

fn dynamic_gvr(target: &ResourceRef) -> Result<Gvr, ProviderError> {
    target.kind.gvr().ok_or_else(|| {
        ProviderError::Unsupported(format!("{} is not a cluster resource", target.short()))
    })
}

fn dynamic_converter(kind: &ResourceKind) -> Convert<DynamicObject> {
    match kind {
        ResourceKind::Chaos(_) => |obj: &DynamicObject| {
            ResourceState::from_conditioned_object(obj).map_err(decode_error)
        },
        _ => |obj: &DynamicObject| ResourceState::from_operator_object(obj).map_err(decode_error),
    }
}

fn decode_error(err: StatusDecodeError) -> ProviderError {
    ProviderError::Decode(err.to_string())
}

fn map_event<K>(
    event: Result<watcher::Event<K>, watcher::Error>,
    convert: Convert<K>,
) -> Option<Result<StateEvent, ProviderError>> {
    match event {
        Ok(watcher::Event::Apply(obj) | watcher::Event::InitApply(obj)) => {
            Some(convert(&obj).map(StateEvent::Applied))
        }
        Ok(watcher::Event::Delete(_)) => Some(Ok(StateEvent::Deleted)),
        Ok(watcher::Event::Init | watcher::Event::InitDone) => None,
        Err(e) => Some(Err(ProviderError::Subscription(e.to_string()))),
    }
}

/// Map a kube error onto the provider taxonomy
fn classify(target: &ResourceRef, err: kube::Error) -> ProviderError {
    match &err {
        kube::Error::Api(ae)
            if ae.code == 404 && ae.message.contains("could not find the requested resource") =>
        {
            ProviderError::ResourceTypeNotFound(target.kind.to_string())
        }
        kube::Error::Api(ae) if ae.code == 404 => ProviderError::NotFound(target.short()),
        kube::Error::Api(ae) if ae.code == 403 => ProviderError::Forbidden(target.short()),
        kube::Error::Api(ae) if ae.code >= 500 => {
            ProviderError::Unavailable(format!("{}: {}", target.short(), ae.message))
        }
        kube::Error::HyperError(_) | kube::Error::Service(_) => {
            ProviderError::Unavailable(format!("{}: {err}", target.short()))
        }
        _ => ProviderError::Kube(format!("{}: {err}", target.short())),
    }
}

/// Most recent events, oldest first, with `HH:MM:SS` timestamps
fn to_wait_events(events: Vec<Event>) -> Vec<WaitEvent> {
    let mut timed: Vec<(Option<DateTime<FixedOffset>>, Event)> = events
        .into_iter()
        .map(|event| (event_timestamp(&event), event))
        .collect();
    // Events without timestamps sort first and are dropped before recent ones
    timed.sort_by_key(|(ts, _)| *ts);

    let skip = timed.len().saturating_sub(MAX_EVENTS);
    timed
        .into_iter()
        .skip(skip)
        .map(|(ts, event)| WaitEvent {
            reason: event.reason.unwrap_or_else(|| "Unknown".to_string()),
            message: event.message.unwrap_or_default(),
            timestamp: ts.map(|t| t.format("%H:%M:%S").to_string()),
        })
        .collect()
}

fn event_timestamp(event: &Event) -> Option<DateTime<FixedOffset>> {
    let raw = match (&event.last_timestamp, &event.event_time, &event.first_timestamp) {
        (Some(t), _, _) => serde_json::to_value(t).ok(),
        (None, Some(t), _) => serde_json::to_value(t).ok(),
        (None, None, Some(t)) => serde_json::to_value(t).ok(),
        (None, None, None) => None,
    }?;
    DateTime::parse_from_rfc3339(raw.as_str()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(reason: &str, last_timestamp: Option<&str>) -> Event {
        serde_json::from_value(json!({
            "metadata": { "name": format!("vmsingle-overwatch.{reason}") },
            "involvedObject": { "kind": "VMSingle", "name": "overwatch" },
            "reason": reason,
            "message": format!("{reason} happened"),
            "lastTimestamp": last_timestamp,
        }))
        .unwrap()
    }

    fn api_error(code: u16, reason: &str, message: &str) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: reason.to_string(),
            code,
        })
    }

    fn podchaos() -> ResourceRef {
        ResourceRef::new(ResourceKind::Chaos("podchaos".into()), "vm", "vmstorage-kill")
    }

    #[test]
    fn test_classify_missing_crd_is_terminal() {
        let err = classify(
            &podchaos(),
            api_error(404, "NotFound", "the server could not find the requested resource"),
        );
        assert!(matches!(err, ProviderError::ResourceTypeNotFound(_)));
        assert!(err.is_terminal());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_classify_missing_object_is_retried() {
        let err = classify(
            &podchaos(),
            api_error(404, "NotFound", r#"podchaos.chaos-mesh.org "vmstorage-kill" not found"#),
        );
        assert!(matches!(err, ProviderError::NotFound(_)));
        assert!(err.is_not_found());
        assert!(!err.is_terminal());
    }

    #[test]
    fn test_classify_forbidden_is_terminal() {
        let err = classify(
            &podchaos(),
            api_error(403, "Forbidden", "podchaos is forbidden: cannot get resource"),
        );
        assert!(matches!(err, ProviderError::Forbidden(_)));
        assert!(err.is_terminal());
    }

    #[test]
    fn test_classify_server_errors_are_retried() {
        for code in [500, 503] {
            let err = classify(&podchaos(), api_error(code, "InternalError", "etcd timeout"));
            match &err {
                ProviderError::Unavailable(message) => assert!(message.contains("etcd timeout")),
                other => panic!("expected unavailable, got {other:?}"),
            }
            assert!(!err.is_terminal());
        }
    }

    #[test]
    fn test_classify_other_api_errors() {
        let err = classify(&podchaos(), api_error(409, "Conflict", "object modified"));
        assert!(matches!(err, ProviderError::Kube(_)));
        assert!(!err.is_terminal());
    }

    #[test]
    fn test_events_sorted_and_formatted() {
        let events = to_wait_events(vec![
            event("Scaled", Some("2024-01-15T10:42:30Z")),
            event("Created", Some("2024-01-15T10:42:01Z")),
        ]);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].reason, "Created");
        assert_eq!(events[0].timestamp.as_deref(), Some("10:42:01"));
        assert_eq!(events[1].reason, "Scaled");
        assert_eq!(events[1].message, "Scaled happened");
    }

    #[test]
    fn test_events_keep_most_recent() {
        let mut events: Vec<Event> = (0..15)
            .map(|i| event(&format!("E{i:02}"), Some(&format!("2024-01-15T10:42:{i:02}Z"))))
            .collect();
        events.push(event("Untimed", None));

        let kept = to_wait_events(events);
        assert_eq!(kept.len(), MAX_EVENTS);
        assert_eq!(kept[0].reason, "E05");
        assert_eq!(kept[MAX_EVENTS - 1].reason, "E14");
    }

    #[test]
    fn test_map_event() {
        let convert: Convert<Service> = |s| Ok(s.into());

        let applied = map_event(Ok(watcher::Event::Apply(Service::default())), convert);
        assert!(matches!(
            applied,
            Some(Ok(StateEvent::Applied(ResourceState::ServiceIngress { .. })))
        ));

        let deleted = map_event(Ok(watcher::Event::Delete(Service::default())), convert);
        assert_eq!(deleted, Some(Ok(StateEvent::Deleted)));

        assert!(map_event(Ok(watcher::Event::<Service>::Init), convert).is_none());
        assert!(map_event(Ok(watcher::Event::<Service>::InitDone), convert).is_none());
    }

    #[test]
    fn test_dynamic_converter_by_kind() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "chaos-mesh.org/v1alpha1",
            "kind": "PodChaos",
            "metadata": { "name": "vmstorage-kill" },
            "status": { "conditions": [{ "type": "AllRecovered", "status": "True" }] }
        }))
        .unwrap();

        let state = dynamic_converter(&ResourceKind::Chaos("podchaos".into()))(&obj).unwrap();
        assert_eq!(state.kind_name(), "condition list");

        let state = dynamic_converter(&ResourceKind::VMSingle)(&obj).unwrap();
        assert_eq!(state.kind_name(), "custom resource status");
    }

    #[tokio::test]
    #[ignore] // Requires a cluster with the VictoriaMetrics operator installed
    async fn test_missing_resource_is_not_found() {
        let provider = KubeProvider::try_default().await.unwrap();
        let target = ResourceRef::new(ResourceKind::Deployment, "default", "does-not-exist");
        assert!(provider.get(&target).await.unwrap_err().is_not_found());
    }
}
