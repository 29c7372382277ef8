// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Running the external provider binary for a payload

use crate::constants::MAX_STDERR_LEN;
use crate::error::{Result, RotationError};
use crate::rotation::payload::Payload;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

const REDACTED: &str = "[REDACTED]";

/// Flags whose values carry parameters or credentials and must not be logged
const SENSITIVE_FLAGS: [&str; 2] = ["--attributes", "--secrets"];

/// What a successful provider run printed
#[derive(Debug, Default, Clone)]
pub struct InvocationOutput {
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait ProviderInvoker: Send + Sync {
    /// Run the provider for `payload`, giving up after `timeout`
    async fn invoke(&self, payload: &Payload, timeout: Duration) -> Result<InvocationOutput>;
}

/// Runs `<providers_dir>/<provider>/provider-<provider>` as a subprocess
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    providers_dir: PathBuf,
}

impl ProcessInvoker {
    pub fn new(providers_dir: impl Into<PathBuf>) -> Self {
        Self {
            providers_dir: providers_dir.into(),
        }
    }
}

#[async_trait]
impl ProviderInvoker for ProcessInvoker {
    #[instrument(skip(self, payload), fields(provider = %payload.provider, target_path = %payload.target_path.display()))]
    async fn invoke(&self, payload: &Payload, timeout: Duration) -> Result<InvocationOutput> {
        let binary = provider_binary(&self.providers_dir, &payload.provider);
        let args = provider_args(payload)?;

        info!(
            "provider command invoked: {} {}",
            binary.display(),
            redacted_command_line(&args)
        );

        let mut cmd = Command::new(&binary);
        cmd.args(args.iter().map(|a| a.as_str()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| RotationError::InvocationIo {
            provider: payload.provider.clone(),
            source: e,
        })?;
        drop(cmd);
        drop(args);

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| RotationError::InvocationIo {
                provider: payload.provider.clone(),
                source: e,
            })?,
            Err(_) => {
                warn!("Provider did not finish within {:?}, killed", timeout);
                return Err(RotationError::InvocationTimeout {
                    provider: payload.provider.clone(),
                    timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(RotationError::InvocationFailed {
                provider: payload.provider.clone(),
                code: output.status.code(),
                stderr: truncate(&stderr, MAX_STDERR_LEN),
            });
        }

        debug!(
            "Provider finished, stdout {} bytes, stderr {} bytes",
            stdout.len(),
            stderr.len()
        );
        Ok(InvocationOutput { stdout, stderr })
    }
}

pub fn provider_binary(providers_dir: &Path, provider: &str) -> PathBuf {
    providers_dir
        .join(provider)
        .join(format!("provider-{}", provider))
}

/// Argument list of the provider protocol. Every value is zeroed on drop since
/// `--secrets` carries credential material.
pub fn provider_args(payload: &Payload) -> Result<Vec<Zeroizing<String>>> {
    let attributes = serde_json::to_string(&payload.attributes)?;
    let secrets = Zeroizing::new(serde_json::to_string(&payload.secrets)?);
    let versions = serde_json::to_string(payload.object_versions.entries())?;

    Ok(vec![
        Zeroizing::new("--attributes".to_string()),
        Zeroizing::new(attributes),
        Zeroizing::new("--secrets".to_string()),
        secrets,
        Zeroizing::new("--targetPath".to_string()),
        Zeroizing::new(payload.target_path.to_string_lossy().into_owned()),
        Zeroizing::new("--objectVersions".to_string()),
        Zeroizing::new(versions),
        Zeroizing::new("--permission".to_string()),
        Zeroizing::new(payload.permission.to_string()),
    ])
}

/// Command line with the values of sensitive flags replaced
pub fn redacted_command_line(args: &[Zeroizing<String>]) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(args.len());
    let mut redact_next = false;
    for arg in args {
        if redact_next {
            parts.push(REDACTED);
            redact_next = false;
            continue;
        }
        redact_next = SENSITIVE_FLAGS.contains(&arg.as_str());
        parts.push(arg.as_str());
    }
    parts.join(" ")
}

fn truncate(text: &str, max: usize) -> String {
    let text = text.trim_end();
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &text[..end])
}
