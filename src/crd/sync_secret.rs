//! # BitwardenSyncSecret
//!
//! Single-target custom resource. The managed Secret carries the name and
//! namespace of the resource itself.

use crate::crd::{AccessTokenSecretRef, SecretAction, SecretSource, Target};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// BitwardenSyncSecret Custom Resource Definition
///
/// Without `accessTokenSecretRef` the resource is synced by the passes of the
/// referenced `BitwardenSyncConfig` (default name `default`). With it, the
/// resource fetches its own snapshot every `syncIntervalSeconds`.
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
    kind = "BitwardenSyncSecret",
    group = "bitwarden-k8s-secrets-manager.demo.redhat.com",
    version = "v1",
    namespaced,
    status = "crate::crd::BitwardenSyncSecretStatus",
    shortname = "bwss",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.secret.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BitwardenSyncSecretSpec {
    /// Config whose snapshot drives this Secret
    #[serde(default)]
    pub config: Option<SyncConfigRef>,
    /// Access token Secret for standalone mode
    #[serde(default, alias = "accessTokenSecret")]
    pub access_token_secret_ref: Option<AccessTokenSecretRef>,
    /// Bitwarden project (name or id) scoping the secret list in standalone mode
    #[serde(default)]
    pub project: Option<String>,
    #[serde(
        default = "crate::crd::default_secret_sync_interval",
        alias = "syncInterval"
    )]
    pub sync_interval_seconds: u64,
    #[serde(default = "crate::crd::default_secret_type", rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub action: SecretAction,
    #[serde(default)]
    pub annotations: BTreeMap<String, SecretSource>,
    #[serde(default)]
    pub labels: BTreeMap<String, SecretSource>,
    #[serde(default)]
    pub data: BTreeMap<String, SecretSource>,
}

/// Reference to a `BitwardenSyncConfig`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfigRef {
    #[serde(default = "crate::crd::default_sync_config_name")]
    pub name: String,
    /// Defaults to the namespace of the `BitwardenSyncSecret`
    #[serde(default)]
    pub namespace: Option<String>,
}

impl BitwardenSyncSecretSpec {
    /// Standalone resources fetch their own snapshot
    #[must_use]
    pub fn is_standalone(&self) -> bool {
        self.access_token_secret_ref.is_some()
    }

    /// (namespace, name) of the owning config
    #[must_use]
    pub fn config_key(&self, own_namespace: &str) -> (String, String) {
        match &self.config {
            Some(config) => (
                config
                    .namespace
                    .clone()
                    .unwrap_or_else(|| own_namespace.to_string()),
                config.name.clone(),
            ),
            None => (
                own_namespace.to_string(),
                crate::constants::DEFAULT_SYNC_CONFIG_NAME.to_string(),
            ),
        }
    }

    /// The Secret to produce, as a target in `namespace` named `name`
    #[must_use]
    pub fn as_target(&self, name: &str, namespace: &str) -> Target {
        Target {
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            type_: self.type_.clone(),
            action: self.action,
            annotations: self.annotations.clone(),
            labels: self.labels.clone(),
            data: self.data.clone(),
        }
    }
}
