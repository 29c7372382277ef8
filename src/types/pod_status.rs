// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

/// Binding between one pod's mounted volume and a SecretProviderClass.
/// Written by the mount path; read-only here.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(
    group = "secrets-store.csi.x-k8s.io",
    version = "v1alpha1",
    kind = "SecretProviderClassPodStatus"
)]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct SecretProviderClassPodStatusSpec {
    #[serde(default)]
    pub pod_name: String,
    #[serde(default)]
    pub target_path: String,
    #[serde(default)]
    pub secret_provider_class_name: String,
    #[serde(default)]
    pub mounted: bool,
}

impl SecretProviderClassPodStatus {
    /// `namespace/name`, used in logs and batch reports
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace().unwrap_or_default(), self.name_any())
    }

    /// Pod name from the spec, falling back to the Pod owner reference
    pub fn workload_name(&self) -> Option<String> {
        if !self.spec.pod_name.is_empty() {
            return Some(self.spec.pod_name.clone());
        }
        self.pod_owner().map(|(name, _)| name)
    }

    /// UID of the owning Pod if the binding carries one
    pub fn owner_uid(&self) -> Option<String> {
        self.pod_owner()
            .map(|(_, uid)| uid)
            .filter(|uid| !uid.is_empty())
    }

    fn pod_owner(&self) -> Option<(String, String)> {
        self.owner_references()
            .iter()
            .find(|o| o.kind == "Pod" && o.api_version == "v1")
            .map(|o| (o.name.clone(), o.uid.clone()))
    }
}
