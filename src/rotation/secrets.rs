// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resolving the nodePublishSecretRef credentials of a binding

use crate::error::{Result, RotationError};
use crate::kubernetes::ClusterStore;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, instrument};
use zeroize::Zeroize;

/// Credential key/value pairs handed to the provider.
/// Values are zeroed on drop and never printed.
#[derive(Default, PartialEq, Eq)]
pub struct SecretData(BTreeMap<String, String>);

impl SecretData {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl From<BTreeMap<String, String>> for SecretData {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl Drop for SecretData {
    fn drop(&mut self) {
        for value in self.0.values_mut() {
            value.zeroize();
        }
    }
}

impl fmt::Debug for SecretData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "[REDACTED]")))
            .finish()
    }
}

impl Serialize for SecretData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Fetch the referenced Secret and re-key its data into a string map.
/// Any failure aborts the binding; a partially filled map is never returned.
#[instrument(skip(store))]
pub async fn materialize(
    store: &dyn ClusterStore,
    credential_ref: &str,
    namespace: &str,
) -> Result<SecretData> {
    if credential_ref.is_empty() {
        return Err(RotationError::CredentialNotFound(format!(
            "no nodePublishSecretRef set in namespace {}",
            namespace
        )));
    }

    let secret = store
        .get_secret(namespace, credential_ref)
        .await
        .map_err(|e| {
            RotationError::CredentialNotFound(format!(
                "{}/{}: {}",
                namespace, credential_ref, e
            ))
        })?;

    let mut data = SecretData::default();
    for (key, value) in secret.data.unwrap_or_default() {
        match String::from_utf8(value.0) {
            Ok(text) => {
                data.0.insert(key, text);
            }
            Err(e) => {
                e.into_bytes().zeroize();
                return Err(RotationError::InvalidCredential {
                    name: format!("{}/{}", namespace, credential_ref),
                    key,
                });
            }
        }
    }

    debug!(
        "Materialized {} credential keys: {:?}",
        data.len(),
        data.keys().collect::<Vec<_>>()
    );
    Ok(data)
}
