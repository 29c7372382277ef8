// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::defaults;
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Reconciler configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Time between two reconciliation passes
    pub poll_interval: Duration,
    /// Directory holding `<provider>/provider-<provider>` binaries
    pub providers_dir: PathBuf,
    /// Kubelet root used to derive volume target paths
    pub kubelet_root_dir: PathBuf,
    /// Upper bound for one provider invocation
    pub provider_timeout: Duration,
    /// Upper bound for a whole pass across all bindings
    pub tick_timeout: Duration,
    pub max_concurrent_bindings: usize,
    /// Total attempts for a status patch that keeps conflicting
    pub status_update_retries: u32,
    /// File mode handed to the provider, in decimal
    pub file_permission: u32,
    /// Only bindings created on this node are reconciled when set
    pub node_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(defaults::POLL_INTERVAL_SECS),
            providers_dir: PathBuf::from(defaults::PROVIDERS_DIR),
            kubelet_root_dir: PathBuf::from(defaults::KUBELET_ROOT_DIR),
            provider_timeout: Duration::from_secs(defaults::PROVIDER_TIMEOUT_SECS),
            tick_timeout: Duration::from_secs(defaults::POLL_INTERVAL_SECS),
            max_concurrent_bindings: defaults::MAX_CONCURRENT_BINDINGS,
            status_update_retries: defaults::STATUS_UPDATE_RETRIES,
            file_permission: defaults::FILE_PERMISSION,
            node_name: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base = Config::default();

        let poll_interval_secs: u64 = parse_or(
            &lookup,
            "ROTATION_POLL_INTERVAL_SECS",
            base.poll_interval.as_secs(),
        )?;
        if poll_interval_secs == 0 {
            anyhow::bail!("ROTATION_POLL_INTERVAL_SECS must be greater than zero");
        }
        // A pass may use the whole interval unless told otherwise
        let tick_timeout_secs: u64 = parse_or(&lookup, "TICK_TIMEOUT_SECS", poll_interval_secs)?;
        let provider_timeout_secs: u64 = parse_or(
            &lookup,
            "PROVIDER_TIMEOUT_SECS",
            base.provider_timeout.as_secs(),
        )?;
        let max_concurrent_bindings: usize = parse_or(
            &lookup,
            "MAX_CONCURRENT_BINDINGS",
            base.max_concurrent_bindings,
        )?;
        let status_update_retries: u32 =
            parse_or(&lookup, "STATUS_UPDATE_RETRIES", base.status_update_retries)?;
        let file_permission: u32 = parse_or(&lookup, "FILE_PERMISSION", base.file_permission)?;

        Ok(Config {
            poll_interval: Duration::from_secs(poll_interval_secs),
            providers_dir: lookup("PROVIDERS_DIR")
                .map(PathBuf::from)
                .unwrap_or(base.providers_dir),
            kubelet_root_dir: lookup("KUBELET_ROOT_DIR")
                .map(PathBuf::from)
                .unwrap_or(base.kubelet_root_dir),
            provider_timeout: Duration::from_secs(provider_timeout_secs),
            tick_timeout: Duration::from_secs(tick_timeout_secs),
            max_concurrent_bindings: max_concurrent_bindings.max(1),
            status_update_retries: status_update_retries.max(1),
            file_permission,
            node_name: lookup("NODE_NAME").filter(|n| !n.is_empty()),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        None => Ok(default),
    }
}
