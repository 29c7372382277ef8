// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: a mock Kubernetes API, in-memory fakes and object fixtures.

use crate::constants::{METADATA_DIR, SECRET_PROVIDER_CLASS_ATTRIBUTE};
use crate::error::{Result, RotationError};
use crate::kubernetes::ClusterStore;
use crate::rotation::payload::Payload;
use crate::rotation::provider::{InvocationOutput, ProviderInvoker};
use crate::types::{
    SecretObjectVersion, SecretProviderClass, SecretProviderClassPodStatus,
    SecretProviderClassPodStatusSpec, SecretProviderClassSpec, SecretProviderClassStatus,
    VersionSet,
};
use async_trait::async_trait;
use http::{Request, Response};
use http_body_util::BodyExt;
use k8s_openapi::api::core::v1::{
    CSIVolumeSource, LocalObjectReference, Pod, PodSpec, Secret, Volume,
};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::client::Body;
use kube::core::ErrorResponse;
use kube::{Client, ResourceExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

type Responses = HashMap<(String, String), (u16, String)>;

/// A mock HTTP service that returns predefined responses based on request paths
/// and records every request body it receives.
#[derive(Clone, Default)]
pub struct MockService {
    responses: Arc<Mutex<Responses>>,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    /// Add a response for PATCH requests matching the exact path
    pub fn on_patch(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PATCH", path, status, body)
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses.lock().unwrap().insert(
            (method.to_string(), path.to_string()),
            (status, body.to_string()),
        );
        self
    }

    /// Bodies of all received requests with the given method, in arrival order
    pub fn requests(&self, method: &str) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();

        if let Some(resp) = responses.get(&(method.to_string(), path.to_string())) {
            return Some(resp.clone());
        }

        // Prefix match, for paths carrying a trailing segment
        responses
            .iter()
            .find(|((m, p), _)| m == method && path.starts_with(p.as_str()))
            .map(|(_, resp)| resp.clone())
    }
}

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let response = self.find_response(&method, &path);
        let requests = self.requests.clone();

        Box::pin(async move {
            let body = match req.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(_) => bytes::Bytes::new(),
            };
            requests
                .lock()
                .unwrap()
                .push((method, String::from_utf8_lossy(&body).into_owned()));

            let (status, body) = response.unwrap_or_else(|| (404, not_found_json("", &path)));
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

fn conflict(namespace: &str, name: &str) -> RotationError {
    RotationError::ConflictRetryable(format!("{}/{}", namespace, name))
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

#[derive(Default)]
struct FakeState {
    bindings: Vec<SecretProviderClassPodStatus>,
    classes: HashMap<(String, String), SecretProviderClass>,
    pods: HashMap<(String, String), Pod>,
    secrets: HashMap<(String, String), Secret>,
    fail_listing: bool,
    unavailable: HashSet<(String, String)>,
    conflicts_remaining: usize,
    replace_on_next_update: Option<SecretProviderClass>,
    update_attempts: usize,
    update_count: usize,
}

/// In-memory `ClusterStore` enforcing resourceVersion checks on status updates
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<FakeState>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(&self, binding: SecretProviderClassPodStatus) {
        self.state.lock().unwrap().bindings.push(binding);
    }

    /// Store a class; one without a resourceVersion gets "1"
    pub fn add_spc(&self, mut spc: SecretProviderClass) {
        spc.metadata
            .resource_version
            .get_or_insert_with(|| "1".to_string());
        let k = key(&spc.namespace().unwrap_or_default(), &spc.name_any());
        self.state.lock().unwrap().classes.insert(k, spc);
    }

    pub fn remove_spc(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .classes
            .remove(&key(namespace, name));
    }

    pub fn add_pod(&self, pod: Pod) {
        let k = key(&pod.namespace().unwrap_or_default(), &pod.name_any());
        self.state.lock().unwrap().pods.insert(k, pod);
    }

    pub fn add_secret(&self, secret: Secret) {
        let k = key(&secret.namespace().unwrap_or_default(), &secret.name_any());
        self.state.lock().unwrap().secrets.insert(k, secret);
    }

    pub fn spc(&self, namespace: &str, name: &str) -> Option<SecretProviderClass> {
        self.state
            .lock()
            .unwrap()
            .classes
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().unwrap().fail_listing = fail;
    }

    /// Gets of any kind for `namespace/name` fail with a 503 until cleared
    pub fn fail_gets_for(&self, namespace: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .unavailable
            .insert(key(namespace, name));
    }

    fn check_available(&self, namespace: &str, name: &str) -> Result<()> {
        if self.state.lock().unwrap().unavailable.contains(&key(namespace, name)) {
            return Err(unavailable());
        }
        Ok(())
    }

    /// Reject the next `n` status updates with a conflict
    pub fn fail_updates_with_conflict(&self, n: usize) {
        self.state.lock().unwrap().conflicts_remaining = n;
    }

    /// Simulate a concurrent writer: the next update call first stores `spc`
    /// under a newer resourceVersion
    pub fn replace_spc_on_next_update(&self, spc: SecretProviderClass) {
        self.state.lock().unwrap().replace_on_next_update = Some(spc);
    }

    /// Status updates that were accepted
    pub fn update_count(&self) -> usize {
        self.state.lock().unwrap().update_count
    }

    /// Status updates that were attempted, accepted or not
    pub fn update_attempts(&self) -> usize {
        self.state.lock().unwrap().update_attempts
    }
}

fn unavailable() -> RotationError {
    RotationError::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: "service unavailable".to_string(),
        reason: "ServiceUnavailable".to_string(),
        code: 503,
    }))
}

fn bump(resource_version: Option<&str>) -> String {
    let current: u64 = resource_version.and_then(|v| v.parse().ok()).unwrap_or(0);
    (current + 1).to_string()
}

#[async_trait]
impl ClusterStore for FakeStore {
    async fn list_bindings(&self) -> Result<Vec<SecretProviderClassPodStatus>> {
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(unavailable());
        }
        Ok(state.bindings.clone())
    }

    async fn get_secret_provider_class(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<SecretProviderClass> {
        self.check_available(namespace, name)?;
        self.spc(namespace, name)
            .ok_or_else(|| RotationError::NotFound {
                kind: "SecretProviderClass",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.check_available(namespace, name)?;
        self.state
            .lock()
            .unwrap()
            .pods
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| RotationError::NotFound {
                kind: "Pod",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        self.check_available(namespace, name)?;
        self.state
            .lock()
            .unwrap()
            .secrets
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| RotationError::NotFound {
                kind: "Secret",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn update_versions(
        &self,
        spc: &SecretProviderClass,
        versions: &VersionSet,
    ) -> Result<SecretProviderClass> {
        let namespace = spc.namespace().unwrap_or_default();
        let name = spc.name_any();
        let k = key(&namespace, &name);

        let mut state = self.state.lock().unwrap();
        state.update_attempts += 1;

        if let Some(mut concurrent) = state.replace_on_next_update.take() {
            concurrent.metadata.resource_version =
                Some(bump(concurrent.metadata.resource_version.as_deref()));
            state.classes.insert(k.clone(), concurrent);
        }
        if state.conflicts_remaining > 0 {
            state.conflicts_remaining -= 1;
            return Err(conflict(&namespace, &name));
        }

        let stored = state
            .classes
            .get_mut(&k)
            .ok_or_else(|| RotationError::NotFound {
                kind: "SecretProviderClass",
                namespace: namespace.clone(),
                name: name.clone(),
            })?;
        if stored.metadata.resource_version != spc.metadata.resource_version {
            return Err(conflict(&namespace, &name));
        }

        stored.status = Some(SecretProviderClassStatus {
            objects: versions.entries().to_vec(),
        });
        stored.metadata.resource_version = Some(bump(stored.metadata.resource_version.as_deref()));
        let updated = stored.clone();
        state.update_count += 1;
        Ok(updated)
    }
}

/// What a `FakeInvoker` does for a target path
#[derive(Debug, Clone)]
pub enum FakeBehaviour {
    /// Write one metadata file per (object, version)
    Write(Vec<(String, String)>),
    /// Succeed without touching the target path
    WriteNothing,
    Fail { code: i32, stderr: String },
    /// Never finish within the timeout
    Hang,
    Panic,
}

impl FakeBehaviour {
    pub fn write(objects: &[(&str, &str)]) -> Self {
        FakeBehaviour::Write(
            objects
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// A recorded provider call
#[derive(Debug, Clone)]
pub struct Invocation {
    pub target_path: PathBuf,
    pub attributes: BTreeMap<String, String>,
    pub secrets: BTreeMap<String, String>,
    pub object_versions: Vec<SecretObjectVersion>,
}

/// `ProviderInvoker` acting like a provider that writes metadata files
#[derive(Default)]
pub struct FakeInvoker {
    behaviours: Mutex<HashMap<PathBuf, FakeBehaviour>>,
    calls: Mutex<Vec<Invocation>>,
    delay: Mutex<Option<Duration>>,
    running: Arc<AtomicUsize>,
    max_running: AtomicUsize,
}

/// Counts one running invocation until dropped
struct Running(Arc<AtomicUsize>);

impl Drop for Running {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behaviour(&self, target_path: &Path, behaviour: FakeBehaviour) {
        self.behaviours
            .lock()
            .unwrap()
            .insert(target_path.to_path_buf(), behaviour);
    }

    /// Sleep this long before acting on any call
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of invocations that were running at the same time
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, target_path: &Path) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.target_path == target_path)
            .count()
    }
}

#[async_trait]
impl ProviderInvoker for FakeInvoker {
    async fn invoke(&self, payload: &Payload, timeout: Duration) -> Result<InvocationOutput> {
        self.calls.lock().unwrap().push(Invocation {
            target_path: payload.target_path.clone(),
            attributes: payload.attributes.clone(),
            secrets: payload.secrets.as_map().clone(),
            object_versions: payload.object_versions.entries().to_vec(),
        });

        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        let _running = Running(self.running.clone());
        self.max_running.fetch_max(now_running, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let behaviour = self
            .behaviours
            .lock()
            .unwrap()
            .get(&payload.target_path)
            .cloned()
            .unwrap_or(FakeBehaviour::WriteNothing);

        match behaviour {
            FakeBehaviour::Write(objects) => {
                let dir = payload.target_path.join(METADATA_DIR);
                std::fs::create_dir_all(&dir).unwrap();
                for (name, version) in objects {
                    std::fs::write(dir.join(name), format!("{}\n", version)).unwrap();
                }
                Ok(InvocationOutput::default())
            }
            FakeBehaviour::WriteNothing => Ok(InvocationOutput::default()),
            FakeBehaviour::Fail { code, stderr } => Err(RotationError::InvocationFailed {
                provider: payload.provider.clone(),
                code: Some(code),
                stderr,
            }),
            FakeBehaviour::Panic => panic!("provider for {} crashed", payload.provider),
            FakeBehaviour::Hang => {
                tokio::time::sleep(timeout).await;
                Err(RotationError::InvocationTimeout {
                    provider: payload.provider.clone(),
                    timeout,
                })
            }
        }
    }
}

/// SecretProviderClass for the "azure" provider
pub fn make_spc(namespace: &str, name: &str, parameters: &[(&str, &str)]) -> SecretProviderClass {
    SecretProviderClass {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: SecretProviderClassSpec {
            provider: "azure".to_string(),
            parameters: parameters
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        },
        status: None,
    }
}

/// Pod with the given volumes; an empty `uid` leaves it unset
pub fn make_pod(namespace: &str, name: &str, uid: &str, volumes: Vec<Volume>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: (!uid.is_empty()).then(|| uid.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            volumes: Some(volumes),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn csi_volume(
    name: &str,
    driver: &str,
    spc_name: Option<&str>,
    secret_ref: Option<&str>,
) -> Volume {
    Volume {
        name: name.to_string(),
        csi: Some(CSIVolumeSource {
            driver: driver.to_string(),
            volume_attributes: spc_name.map(|spc| {
                BTreeMap::from([(SECRET_PROVIDER_CLASS_ATTRIBUTE.to_string(), spc.to_string())])
            }),
            node_publish_secret_ref: secret_ref.map(|s| LocalObjectReference {
                name: s.to_string(),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn make_secret(namespace: &str, name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

/// Mounted binding without owner references
pub fn make_binding(
    namespace: &str,
    pod_name: &str,
    spc_name: &str,
    target_path: &str,
) -> SecretProviderClassPodStatus {
    SecretProviderClassPodStatus {
        metadata: ObjectMeta {
            name: Some(format!("{}-{}-{}", pod_name, namespace, spc_name)),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: SecretProviderClassPodStatusSpec {
            pod_name: pod_name.to_string(),
            target_path: target_path.to_string(),
            secret_provider_class_name: spc_name.to_string(),
            mounted: true,
        },
    }
}
