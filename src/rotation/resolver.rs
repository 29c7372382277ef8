// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Loading the SecretProviderClass and Pod a binding points at

use crate::error::{Result, RotationError};
use crate::kubernetes::ClusterStore;
use crate::types::{SecretProviderClass, SecretProviderClassPodStatus};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ResolvedBinding {
    pub spc: SecretProviderClass,
    pub pod: Pod,
}

/// Check the binding is usable, then fetch what it refers to.
/// Deleted objects surface as `NotFound`, which the driver treats as churn.
pub async fn resolve(
    store: &dyn ClusterStore,
    binding: &SecretProviderClassPodStatus,
) -> Result<ResolvedBinding> {
    let key = binding.key();
    let malformed = |what: &str| RotationError::MalformedBinding(format!("{} has no {}", key, what));

    let namespace = binding
        .namespace()
        .filter(|ns| !ns.is_empty())
        .ok_or_else(|| malformed("namespace"))?;
    if binding.spec.target_path.is_empty() {
        return Err(malformed("targetPath"));
    }
    let spc_name = binding.spec.secret_provider_class_name.as_str();
    if spc_name.is_empty() {
        return Err(malformed("secretProviderClassName"));
    }
    let pod_name = binding
        .workload_name()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| malformed("podName"))?;

    if !binding.spec.mounted {
        return Err(RotationError::NotMounted(key));
    }

    let spc = store.get_secret_provider_class(&namespace, spc_name).await?;
    let pod = store.get_pod(&namespace, &pod_name).await?;

    // Same name but a different pod: the binding outlived the pod it was made for
    if let (Some(owner_uid), Some(pod_uid)) = (binding.owner_uid(), pod.metadata.uid.as_deref()) {
        if owner_uid != pod_uid {
            debug!(
                "Binding {} belongs to pod uid {}, found {}",
                key, owner_uid, pod_uid
            );
            return Err(RotationError::NotFound {
                kind: "Pod",
                namespace,
                name: pod_name,
            });
        }
    }

    Ok(ResolvedBinding { spc, pod })
}
