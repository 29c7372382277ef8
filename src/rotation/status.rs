// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Merging fresh object versions into `status.objects`

use crate::error::{Result, RotationError};
use crate::kubernetes::ClusterStore;
use crate::types::{SecretObjectVersion, SecretProviderClass};
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

/// Merge `records` into the class's VersionSet and persist it.
/// Conflicts re-fetch the class and retry, `attempts` tries in total.
/// Returns how many entries changed; nothing is written when that is zero.
#[instrument(skip(store, spc, records), fields(spc = %format!("{}/{}", spc.namespace().unwrap_or_default(), spc.name_any())))]
pub async fn merge_and_persist(
    store: &dyn ClusterStore,
    mut spc: SecretProviderClass,
    records: &[SecretObjectVersion],
    attempts: u32,
) -> Result<usize> {
    let namespace = spc.namespace().unwrap_or_default();
    let name = spc.name_any();
    let attempts = attempts.max(1);

    for attempt in 1..=attempts {
        let mut versions = spc.version_set();
        let changed = versions.merge(records);
        if changed == 0 {
            debug!("Object versions unchanged, skipping status update");
            return Ok(0);
        }

        match store.update_versions(&spc, &versions).await {
            Ok(_) => {
                info!("Updated {} object versions", changed);
                return Ok(changed);
            }
            Err(RotationError::ConflictRetryable(_)) if attempt < attempts => {
                warn!(
                    "Status update conflicted (attempt {}/{}), re-fetching",
                    attempt, attempts
                );
                spc = store.get_secret_provider_class(&namespace, &name).await?;
            }
            Err(e) => return Err(e),
        }
    }

    Err(RotationError::ConflictRetryable(format!("{}/{}", namespace, name)))
}
