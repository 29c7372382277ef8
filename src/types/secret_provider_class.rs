// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::parameters;
use crate::error::{Result, RotationError};
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(
    group = "secrets-store.csi.x-k8s.io",
    version = "v1alpha1",
    kind = "SecretProviderClass"
)]
#[kube(namespaced)]
#[kube(status = "SecretProviderClassStatus")]
#[serde(rename_all = "camelCase")]
pub struct SecretProviderClassSpec {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretProviderClassStatus {
    #[serde(default)]
    pub objects: Vec<SecretObjectVersion>,
}

/// One `(objectName, objectVersion)` pair
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretObjectVersion {
    pub object_name: String,
    pub object_version: String,
}

impl SecretObjectVersion {
    pub fn new(object_name: impl Into<String>, object_version: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            object_version: object_version.into(),
        }
    }
}

/// Ordered object name to version mapping persisted in `status.objects`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionSet {
    entries: Vec<SecretObjectVersion>,
}

impl VersionSet {
    pub fn get(&self, object_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.object_name == object_name)
            .map(|e| e.object_version.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[SecretObjectVersion] {
        &self.entries
    }

    /// Replace entries whose name matches a record and append unknown ones.
    /// Entries not named by any record are left untouched, in place.
    /// Returns the number of entries that changed.
    pub fn merge(&mut self, records: &[SecretObjectVersion]) -> usize {
        let mut changed = 0;
        for record in records {
            match self
                .entries
                .iter_mut()
                .find(|e| e.object_name == record.object_name)
            {
                Some(existing) if existing.object_version == record.object_version => {}
                Some(existing) => {
                    existing.object_version = record.object_version.clone();
                    changed += 1;
                }
                None => {
                    self.entries.push(record.clone());
                    changed += 1;
                }
            }
        }
        changed
    }
}

impl From<Vec<SecretObjectVersion>> for VersionSet {
    fn from(entries: Vec<SecretObjectVersion>) -> Self {
        Self { entries }
    }
}

/// An entry of the `objects` parameter
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestedObject {
    pub object_name: String,
    #[serde(default)]
    pub object_type: Option<String>,
    #[serde(default)]
    pub object_version: Option<String>,
    #[serde(default)]
    pub object_alias: Option<String>,
}

#[derive(Deserialize)]
struct ObjectsArray {
    #[serde(default)]
    array: Vec<String>,
}

impl SecretProviderClass {
    /// Provider identifier; it names a directory and binary, so it is restricted
    pub fn provider(&self) -> Result<&str> {
        let provider = self.spec.provider.as_str();
        if provider.is_empty() {
            return Err(RotationError::InvalidParameters(format!(
                "SecretProviderClass {} has no provider",
                self.name_any()
            )));
        }
        if !provider
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(RotationError::InvalidParameters(format!(
                "SecretProviderClass {} has an invalid provider name {:?}",
                self.name_any(),
                provider
            )));
        }
        Ok(provider)
    }

    fn parameter(&self, key: &str) -> Option<&str> {
        self.spec.parameters.get(key).map(|s| s.as_str())
    }

    fn flag(&self, key: &str) -> bool {
        self.parameter(key)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    pub fn keyvault_name(&self) -> Option<&str> {
        self.parameter(parameters::KEYVAULT_NAME)
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.parameter(parameters::TENANT_ID)
    }

    pub fn user_assigned_identity_id(&self) -> Option<&str> {
        self.parameter(parameters::USER_ASSIGNED_IDENTITY_ID)
            .filter(|v| !v.is_empty())
    }

    /// Whether the provider needs the pod's nodePublishSecretRef credentials
    pub fn requires_cluster_credentials(&self) -> bool {
        !(self.flag(parameters::USE_POD_IDENTITY) || self.flag(parameters::USE_VM_MANAGED_IDENTITY))
    }

    /// Parse the `objects` parameter, an `array:` of YAML encoded object descriptions
    pub fn requested_objects(&self) -> Result<Vec<RequestedObject>> {
        let Some(raw) = self.parameter(parameters::OBJECTS) else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let invalid = |e: serde_yaml::Error| {
            RotationError::InvalidParameters(format!(
                "SecretProviderClass {} has a malformed objects parameter: {}",
                self.name_any(),
                e
            ))
        };

        let outer: ObjectsArray = serde_yaml::from_str(raw).map_err(invalid)?;
        outer
            .array
            .iter()
            .map(|item| serde_yaml::from_str::<RequestedObject>(item).map_err(invalid))
            .collect()
    }

    /// The versions recorded by previous cycles
    pub fn version_set(&self) -> VersionSet {
        self.status
            .as_ref()
            .map(|s| VersionSet::from(s.objects.clone()))
            .unwrap_or_default()
    }
}
