// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The rotation pipeline: resolve a binding, build the provider payload, run
//! the provider, read back the versions it recorded and persist them.

pub mod batch;
pub mod manager;
pub mod metadata;
pub mod payload;
pub mod provider;
pub mod resolver;
pub mod secrets;
pub mod status;

pub use batch::{BatchResult, BindingOutcome, BindingReport};
pub use manager::RotationManager;
pub use payload::{Payload, PayloadBuilder};
pub use provider::{InvocationOutput, ProcessInvoker, ProviderInvoker};
pub use secrets::SecretData;
