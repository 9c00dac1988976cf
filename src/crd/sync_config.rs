//! # BitwardenSyncConfig
//!
//! Multi-target custom resource: one access token, many managed Secrets.

use crate::crd::{AccessTokenSecretRef, Target};
use serde::{Deserialize, Serialize};

/// BitwardenSyncConfig Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: bitwarden-k8s-secrets-manager.demo.redhat.com/v1
/// kind: BitwardenSyncConfig
/// metadata:
///   name: default
///   namespace: my-app
/// spec:
///   accessTokenSecretRef:
///     name: bitwarden-access-token
///   syncIntervalSeconds: 300
///   targets:
///     - name: database
///       data:
///         password:
///           secret: database
///           key: password
/// ```
#[derive(
    kube::CustomResource,
    Debug,
    Clone,
    Default,
    PartialEq,
    Deserialize,
    Serialize,
    schemars::JsonSchema,
)]
#[kube(
    kind = "BitwardenSyncConfig",
    group = "bitwarden-k8s-secrets-manager.demo.redhat.com",
    version = "v1",
    namespaced,
    status = "crate::crd::BitwardenSyncConfigStatus",
    shortname = "bwsc",
    printcolumn = r#"{"name":"Interval", "type":"integer", "jsonPath":".spec.syncIntervalSeconds"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BitwardenSyncConfigSpec {
    /// Secret holding the Bitwarden access token in `data.token`
    /// Falls back to the controller-wide default name when unset
    #[serde(default, alias = "accessTokenSecret")]
    pub access_token_secret_ref: Option<AccessTokenSecretRef>,
    /// Bitwarden project (name or id) scoping the secret list
    #[serde(default)]
    pub project: Option<String>,
    /// Seconds between sync passes
    #[serde(
        default = "crate::crd::default_config_sync_interval",
        alias = "syncInterval"
    )]
    pub sync_interval_seconds: u64,
    /// Managed Secrets
    #[serde(default, alias = "secrets")]
    pub targets: Vec<Target>,
}
