// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// API group shared by SecretProviderClass and SecretProviderClassPodStatus
pub const API_GROUP: &str = "secrets-store.csi.x-k8s.io";

/// API version of the secrets-store custom resources
pub const API_VERSION: &str = "v1alpha1";

/// CSI driver name a pod volume must use to be considered ours
pub const DRIVER_NAME: &str = "secrets-store.csi.k8s.io";

/// Directory beneath the target path where the provider records object versions
pub const METADATA_DIR: &str = ".metadata";

/// Field manager used for status patches
pub const OPERATOR_NAME: &str = "rotation-reconciler";

/// Label carried by bindings naming the node that mounted the volume
pub const NODE_NAME_LABEL: &str = "internal.secrets-store.csi.k8s.io/node-name";

/// Keys inside `SecretProviderClass.spec.parameters`
pub mod parameters {
    pub const KEYVAULT_NAME: &str = "keyvaultName";
    pub const TENANT_ID: &str = "tenantId";
    pub const OBJECTS: &str = "objects";
    pub const USE_POD_IDENTITY: &str = "usePodIdentity";
    pub const USE_VM_MANAGED_IDENTITY: &str = "useVMManagedIdentity";
    pub const USER_ASSIGNED_IDENTITY_ID: &str = "userAssignedIdentityID";
}

/// Pod identity attributes appended to the provider attributes
pub mod attributes {
    pub const POD_NAME: &str = "csi.storage.k8s.io/pod.name";
    pub const POD_NAMESPACE: &str = "csi.storage.k8s.io/pod.namespace";
    pub const POD_UID: &str = "csi.storage.k8s.io/pod.uid";
    pub const SERVICE_ACCOUNT_NAME: &str = "csi.storage.k8s.io/serviceAccount.name";
}

/// Volume attribute naming the SecretProviderClass a CSI volume mounts
pub const SECRET_PROVIDER_CLASS_ATTRIBUTE: &str = "secretProviderClass";

/// Defaults for the environment driven configuration
pub mod defaults {
    pub const POLL_INTERVAL_SECS: u64 = 60;
    pub const PROVIDERS_DIR: &str = "/etc/kubernetes/secrets-store-csi-providers";
    pub const KUBELET_ROOT_DIR: &str = "/var/lib/kubelet";
    pub const PROVIDER_TIMEOUT_SECS: u64 = 30;
    pub const MAX_CONCURRENT_BINDINGS: usize = 4;
    pub const STATUS_UPDATE_RETRIES: u32 = 3;
    /// 0644
    pub const FILE_PERMISSION: u32 = 420;
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Upper bound on provider stderr carried inside errors
pub const MAX_STDERR_LEN: usize = 1024;
