// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Periodic driver running the rotation pipeline over every binding.

use crate::config::Config;
use crate::error::{Disposition, Result, RotationError};
use crate::kubernetes::ClusterStore;
use crate::rotation::batch::{BatchResult, BindingOutcome, BindingReport};
use crate::rotation::payload::{credential_ref, select_volume, PayloadBuilder};
use crate::rotation::provider::ProviderInvoker;
use crate::rotation::secrets::{materialize, SecretData};
use crate::rotation::{metadata, resolver, status};
use crate::types::SecretProviderClassPodStatus;
use futures::{stream, FutureExt, StreamExt};
use kube::ResourceExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use tokio::time::{interval, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Drives reconciliation passes. At most one pass runs at a time; bindings
/// within a pass run concurrently, serialized per target path.
pub struct RotationManager {
    store: Arc<dyn ClusterStore>,
    invoker: Arc<dyn ProviderInvoker>,
    builder: PayloadBuilder,
    config: Config,
    in_flight: Mutex<()>,
}

impl RotationManager {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        invoker: Arc<dyn ProviderInvoker>,
        config: Config,
    ) -> Self {
        Self {
            store,
            invoker,
            builder: PayloadBuilder::new(config.kubelet_root_dir.clone(), config.file_permission),
            config,
            in_flight: Mutex::new(()),
        }
    }

    /// Tick every `poll_interval` until ctrl-c. Dropping an in-flight pass kills
    /// any provider it is waiting on.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            "RotationManager started, polling every {:?}",
            self.config.poll_interval
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Received shutdown signal, stopping rotation loop");
                    return Ok(());
                }
                _ = self.tick(&mut ticker) => {}
            }
        }
    }

    async fn tick(&self, ticker: &mut tokio::time::Interval) {
        ticker.tick().await;
        match self.run_once().await {
            Ok(Some(batch)) => info!("Rotation pass finished: {}", batch),
            Ok(None) => debug!("Rotation pass still in flight, tick coalesced"),
            Err(e) => error!("Rotation pass aborted: {}", e),
        }
    }

    /// One pass over all bindings. Returns `None` when another pass is in flight.
    /// Fails only when the bindings cannot be listed.
    pub async fn run_once(&self) -> Result<Option<BatchResult>> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            return Ok(None);
        };
        let deadline = Instant::now() + self.config.tick_timeout;

        let bindings = timeout_at(deadline, self.store.list_bindings())
            .await
            .map_err(|_| RotationError::DeadlineExceeded("listing bindings"))??;
        debug!("Found {} bindings", bindings.len());

        let locks = PathLocks::default();
        let reports = stream::iter(bindings.iter())
            .map(|binding| self.process_binding(binding, deadline, &locks))
            .buffer_unordered(self.config.max_concurrent_bindings)
            .collect::<Vec<_>>()
            .await;

        Ok(Some(BatchResult { reports }))
    }

    /// Run the pipeline for one binding inside its own failure boundary
    async fn process_binding(
        &self,
        binding: &SecretProviderClassPodStatus,
        deadline: Instant,
        locks: &PathLocks,
    ) -> BindingReport {
        let key = binding.key();
        let span = info_span!("binding", binding = %key);

        let pipeline = self.reconcile_binding(binding, deadline, locks);
        let result = AssertUnwindSafe(timeout_at(deadline, pipeline))
            .catch_unwind()
            .instrument(span.clone())
            .await;

        let outcome = {
            let _entered = span.enter();
            match result {
                Ok(Ok(Ok(updated))) => BindingOutcome::Succeeded { updated },
                Ok(Ok(Err(e))) => classify(&key, e),
                Ok(Err(_)) => {
                    warn!("Binding {} did not finish before the pass deadline", key);
                    BindingOutcome::TimedOut
                }
                Err(_) => {
                    error!("Binding {} pipeline panicked", key);
                    BindingOutcome::Failed {
                        error: "pipeline panicked".to_string(),
                    }
                }
            }
        };

        BindingReport {
            binding: key,
            target_path: binding.spec.target_path.clone(),
            outcome,
        }
    }

    async fn reconcile_binding(
        &self,
        binding: &SecretProviderClassPodStatus,
        deadline: Instant,
        locks: &PathLocks,
    ) -> Result<usize> {
        let store = self.store.as_ref();
        let resolved = resolver::resolve(store, binding).await?;
        let namespace = resolved.spc.namespace().unwrap_or_default();
        let spc_name = resolved.spc.name_any();

        let requested = resolved.spc.requested_objects()?;
        debug!(
            keyvault = ?resolved.spc.keyvault_name(),
            tenant = ?resolved.spc.tenant_id(),
            identity = ?resolved.spc.user_assigned_identity_id(),
            "SecretProviderClass {} requests {} objects",
            spc_name,
            requested.len()
        );

        let secrets = if resolved.spc.requires_cluster_credentials() {
            let volume = select_volume(&resolved.pod, &spc_name, &binding.spec.target_path)?;
            let credential = credential_ref(volume).unwrap_or_default();
            materialize(store, credential, &namespace).await?
        } else {
            SecretData::default()
        };

        let payload = self.builder.build(
            &resolved.spc,
            &resolved.pod,
            &binding.spec.target_path,
            secrets,
        )?;
        if payload.target_path != Path::new(&binding.spec.target_path) {
            warn!(
                "Binding records target path {} but the pod volume resolves to {}",
                binding.spec.target_path,
                payload.target_path.display()
            );
        }

        // Held until the status write, across everything touching the target path
        let lock = locks.for_path(&payload.target_path);
        let _path_guard = lock.lock().await;

        let remaining = deadline.saturating_duration_since(Instant::now());
        let timeout = self.config.provider_timeout.min(remaining);
        let output = self.invoker.invoke(&payload, timeout).await?;
        debug!(
            "Provider wrote {} bytes to stdout, stderr: {}",
            output.stdout.len(),
            output.stderr.trim_end()
        );

        let target_path = payload.target_path.clone();
        drop(payload);

        let records = metadata::read_versions(&target_path).await?;
        status::merge_and_persist(
            store,
            resolved.spc,
            &records,
            self.config.status_update_retries,
        )
        .await
    }
}

fn classify(key: &str, err: RotationError) -> BindingOutcome {
    match err.disposition() {
        Disposition::Skip => {
            match &err {
                RotationError::KubeError(_) => {
                    warn!("Skipping binding {} this pass: {}", key, err)
                }
                _ => debug!("Skipping binding {}: {}", key, err),
            }
            BindingOutcome::Skipped {
                reason: err.to_string(),
            }
        }
        Disposition::Timeout => {
            warn!("Binding {} timed out: {}", key, err);
            BindingOutcome::TimedOut
        }
        Disposition::Fail => {
            error!("Failed to rotate binding {}: {}", key, err);
            BindingOutcome::Failed {
                error: err.to_string(),
            }
        }
    }
}

/// One mutex per derived target path, shared by the bindings of a pass
#[derive(Default)]
struct PathLocks(std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>);

impl PathLocks {
    fn for_path(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(path.to_path_buf()).or_default().clone()
    }
}
