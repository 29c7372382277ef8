// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Assembling the provider request for one binding

use crate::constants::{attributes, DRIVER_NAME, SECRET_PROVIDER_CLASS_ATTRIBUTE};
use crate::error::{Result, RotationError};
use crate::rotation::secrets::SecretData;
use crate::types::{SecretProviderClass, VersionSet};
use k8s_openapi::api::core::v1::{Pod, Volume};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Everything one provider invocation needs; lives for a single pipeline run
#[derive(Debug)]
pub struct Payload {
    pub provider: String,
    pub target_path: PathBuf,
    pub attributes: BTreeMap<String, String>,
    pub secrets: SecretData,
    /// Versions recorded before this cycle, for the provider to diff against
    pub object_versions: VersionSet,
    pub permission: u32,
}

#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    kubelet_root_dir: PathBuf,
    file_permission: u32,
}

impl PayloadBuilder {
    pub fn new(kubelet_root_dir: impl Into<PathBuf>, file_permission: u32) -> Self {
        Self {
            kubelet_root_dir: kubelet_root_dir.into(),
            file_permission,
        }
    }

    pub fn build(
        &self,
        spc: &SecretProviderClass,
        pod: &Pod,
        recorded_target_path: &str,
        secrets: SecretData,
    ) -> Result<Payload> {
        let provider = spc.provider()?.to_string();
        let volume = select_volume(pod, &spc.name_any(), recorded_target_path)?;

        let pod_uid = pod
            .metadata
            .uid
            .as_deref()
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| {
                RotationError::MalformedBinding(format!("pod {} has no uid", pod.name_any()))
            })?;

        let mut attrs = spc.spec.parameters.clone();
        attrs.insert(attributes::POD_NAME.to_string(), pod.name_any());
        attrs.insert(
            attributes::POD_NAMESPACE.to_string(),
            pod.namespace().unwrap_or_default(),
        );
        attrs.insert(attributes::POD_UID.to_string(), pod_uid.to_string());
        attrs.insert(
            attributes::SERVICE_ACCOUNT_NAME.to_string(),
            pod.spec
                .as_ref()
                .and_then(|s| s.service_account_name.clone())
                .unwrap_or_else(|| "default".to_string()),
        );

        Ok(Payload {
            provider,
            target_path: target_path(&self.kubelet_root_dir, pod_uid, &volume.name),
            attributes: attrs,
            secrets,
            object_versions: spc.version_set(),
            permission: self.file_permission,
        })
    }
}

/// The CSI volume served by our driver that mounts `spc_name`.
///
/// Volumes naming the class in their `secretProviderClass` attribute win over
/// volumes without the attribute. When several volumes remain, the one named in
/// the binding's recorded target path is chosen; if that does not single one
/// out the binding is rejected rather than routed to an arbitrary mount.
pub fn select_volume<'a>(
    pod: &'a Pod,
    spc_name: &str,
    recorded_target_path: &str,
) -> Result<&'a Volume> {
    let mut explicit = Vec::new();
    let mut implicit = Vec::new();
    for volume in pod
        .spec
        .as_ref()
        .into_iter()
        .flat_map(|spec| spec.volumes.iter().flatten())
    {
        let Some(csi) = volume.csi.as_ref().filter(|csi| csi.driver == DRIVER_NAME) else {
            continue;
        };
        match csi
            .volume_attributes
            .as_ref()
            .and_then(|a| a.get(SECRET_PROVIDER_CLASS_ATTRIBUTE))
        {
            Some(name) if name == spc_name => explicit.push(volume),
            Some(_) => {}
            None => implicit.push(volume),
        }
    }

    let pod_key = || format!("{}/{}", pod.namespace().unwrap_or_default(), pod.name_any());
    let candidates = if explicit.is_empty() { implicit } else { explicit };
    match candidates.as_slice() {
        [] => Err(RotationError::NoMatchingVolume {
            pod: pod_key(),
            driver: DRIVER_NAME.to_string(),
        }),
        [only] => Ok(*only),
        several => {
            let recorded = recorded_volume_name(recorded_target_path);
            let mut named = several
                .iter()
                .filter(|v| recorded.is_some_and(|name| v.name == name));
            match (named.next(), named.next()) {
                (Some(volume), None) => Ok(*volume),
                _ => Err(RotationError::MalformedBinding(format!(
                    "pod {} has {} volumes that can serve {} and targetPath {:?} names none of them",
                    pod_key(),
                    several.len(),
                    spc_name,
                    recorded_target_path
                ))),
            }
        }
    }
}

/// `<volume>` out of `.../<volume>/mount`
fn recorded_volume_name(target_path: &str) -> Option<&str> {
    let path = Path::new(target_path);
    if path.file_name()? != "mount" {
        return None;
    }
    path.parent()?.file_name()?.to_str()
}

/// Name of the Secret a volume references for provider credentials
pub fn credential_ref(volume: &Volume) -> Option<&str> {
    volume
        .csi
        .as_ref()
        .and_then(|csi| csi.node_publish_secret_ref.as_ref())
        .map(|r| r.name.as_str())
        .filter(|name| !name.is_empty())
}

/// `<kubeletRoot>/pods/<podUID>/volumes/kubernetes.io~csi/<volume>/mount`
pub fn target_path(kubelet_root_dir: &Path, pod_uid: &str, volume_name: &str) -> PathBuf {
    kubelet_root_dir
        .join("pods")
        .join(pod_uid)
        .join("volumes")
        .join("kubernetes.io~csi")
        .join(volume_name)
        .join("mount")
}
