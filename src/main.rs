// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rotation_reconciler::config::Config;
use rotation_reconciler::kubernetes::{wait_for_crds, KubeStore};
use rotation_reconciler::rotation::{ProcessInvoker, RotationManager};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting secrets-store rotation reconciler");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: poll_interval={:?}, providers_dir={}, node={:?}",
        config.poll_interval,
        config.providers_dir.display(),
        config.node_name
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for secrets-store CRDs to become available...");
    wait_for_crds(&client).await?;

    let store = Arc::new(KubeStore::new(client, config.node_name.clone()));
    let invoker = Arc::new(ProcessInvoker::new(config.providers_dir.clone()));

    RotationManager::new(store, invoker, config).run().await?;

    info!("Rotation reconciler stopped");
    Ok(())
}
