// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster store access used by the rotation pipeline

use crate::constants::{NODE_NAME_LABEL, OPERATOR_NAME};
use crate::error::{Result, RotationError};
use crate::types::{SecretProviderClass, SecretProviderClassPodStatus, VersionSet};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::{
    api::{ListParams, Patch, PatchParams},
    Api, Client, ResourceExt,
};
use tracing::{debug, instrument};

/// Reads and writes the orchestrator objects the reconciler depends on.
/// One handle is shared by every binding pipeline of a pass.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn list_bindings(&self) -> Result<Vec<SecretProviderClassPodStatus>>;

    async fn get_secret_provider_class(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<SecretProviderClass>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret>;

    /// Write `status.objects`, guarded by the resourceVersion of `spc`.
    /// A stale resourceVersion yields `ConflictRetryable`.
    async fn update_versions(
        &self,
        spc: &SecretProviderClass,
        versions: &VersionSet,
    ) -> Result<SecretProviderClass>;
}

/// `ClusterStore` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    node_name: Option<String>,
}

impl KubeStore {
    pub fn new(client: Client, node_name: Option<String>) -> Self {
        Self { client, node_name }
    }

    fn list_params(&self) -> ListParams {
        match &self.node_name {
            Some(node) => ListParams::default().labels(&format!("{}={}", NODE_NAME_LABEL, node)),
            None => ListParams::default(),
        }
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    #[instrument(skip(self), fields(node = ?self.node_name))]
    async fn list_bindings(&self) -> Result<Vec<SecretProviderClassPodStatus>> {
        let bindings: Api<SecretProviderClassPodStatus> = Api::all(self.client.clone());
        let list = bindings.list(&self.list_params()).await?;
        debug!("Listed {} bindings", list.items.len());
        Ok(list.items)
    }

    async fn get_secret_provider_class(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<SecretProviderClass> {
        let api: Api<SecretProviderClass> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| RotationError::from_kube(e, "SecretProviderClass", namespace, name))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| RotationError::from_kube(e, "Pod", namespace, name))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| RotationError::from_kube(e, "Secret", namespace, name))
    }

    #[instrument(skip(self, spc, versions), fields(spc = %spc.name_any()))]
    async fn update_versions(
        &self,
        spc: &SecretProviderClass,
        versions: &VersionSet,
    ) -> Result<SecretProviderClass> {
        let namespace = spc.namespace().unwrap_or_default();
        let name = spc.name_any();
        let api: Api<SecretProviderClass> = Api::namespaced(self.client.clone(), &namespace);

        let patch = versions_patch(spc, versions);
        debug!("Patching status of {}/{}", namespace, name);

        let params = PatchParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        };
        api.patch_status(&name, &params, &Patch::Merge(&patch))
            .await
            .map_err(|e| RotationError::from_kube(e, "SecretProviderClass", &namespace, &name))
    }
}

/// Merge patch replacing `status.objects`; carrying the resourceVersion makes
/// the API server refuse it with 409 when the object moved on.
fn versions_patch(spc: &SecretProviderClass, versions: &VersionSet) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "resourceVersion": spc.resource_version(),
        },
        "status": {
            "objects": versions.entries(),
        }
    })
}
