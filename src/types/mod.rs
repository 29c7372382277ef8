// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resources of the secrets-store API group.

pub mod pod_status;
pub mod secret_provider_class;

pub use pod_status::{SecretProviderClassPodStatus, SecretProviderClassPodStatusSpec};
pub use secret_provider_class::{
    RequestedObject, SecretObjectVersion, SecretProviderClass, SecretProviderClassSpec,
    SecretProviderClassStatus, VersionSet,
};
