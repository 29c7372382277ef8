// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RotationError {
    /// Any cluster store failure that is not a 404 or 409; retried next tick
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("Malformed binding: {0}")]
    MalformedBinding(String),

    #[error("Binding {0} is not mounted")]
    NotMounted(String),

    #[error("No volume on pod {pod} uses driver {driver}")]
    NoMatchingVolume { pod: String, driver: String },

    #[error("Invalid SecretProviderClass parameters: {0}")]
    InvalidParameters(String),

    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    #[error("Credential {name} is not valid UTF-8 under key {key}")]
    InvalidCredential { name: String, key: String },

    #[error("Provider {provider} could not be run: {source}")]
    InvocationIo {
        provider: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Provider {provider} exited with {code:?}: {stderr}")]
    InvocationFailed {
        provider: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Provider {provider} timed out after {timeout:?}")]
    InvocationTimeout { provider: String, timeout: Duration },

    #[error("Provider wrote no metadata under {0}")]
    NoMetadataWritten(PathBuf),

    #[error("Failed to read metadata under {path}: {message}")]
    MetadataRead { path: PathBuf, message: String },

    #[error("Deadline exceeded while {0}")]
    DeadlineExceeded(&'static str),

    #[error("Conflict updating status of {0}")]
    ConflictRetryable(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How the driver reports a failed binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Expected under churn or transient; retried next tick
    Skip,
    /// Needs attention; surfaced as a failure
    Fail,
    /// Exceeded its time budget
    Timeout,
}

impl RotationError {
    pub fn disposition(&self) -> Disposition {
        match self {
            RotationError::KubeError(_)
            | RotationError::NotFound { .. }
            | RotationError::NotMounted(_) => Disposition::Skip,
            RotationError::InvocationTimeout { .. } => Disposition::Timeout,
            _ => Disposition::Fail,
        }
    }

    /// Map a kube error onto the taxonomy: 404 and 409 get their own variants
    pub fn from_kube(err: kube::Error, kind: &'static str, namespace: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(ref resp) if resp.code == 404 => RotationError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(ref resp) if resp.code == 409 => {
                RotationError::ConflictRetryable(format!("{}/{}", namespace, name))
            }
            other => RotationError::KubeError(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, RotationError>;
