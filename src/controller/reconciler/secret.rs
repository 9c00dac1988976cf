//! # Managed-Secret Reconciler
//!
//! Brings one target Secret to its desired state with the smallest mutation,
//! and deletes Secrets only when the ownership markers prove they are ours.
//!
//! Ownership markers on a managed Secret:
//! - label `app.kubernetes.io/managed-by: secrets-manager`
//! - label `<owner label>: <owner uid>` (`<namespace>.<name>` accepted on read)
//! - annotation `<owner label>: {"kind": ..., "name": ..., "namespace": ...}`

use crate::constants::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crate::controller::error::SyncError;
use crate::controller::reconciler::SecretApi;
use crate::crd::SecretAction;
use crate::observability;
use anyhow::Result;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::Resource;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Custom resource owning managed Secrets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub uid: String,
}

impl Owner {
    /// Owner identity of a custom resource
    #[must_use]
    pub fn of<K: Resource<DynamicType = ()>>(obj: &K) -> Self {
        let meta = obj.meta();
        Self {
            kind: K::kind(&()).to_string(),
            name: meta.name.clone().unwrap_or_default(),
            namespace: meta.namespace.clone().unwrap_or_default(),
            uid: meta.uid.clone().unwrap_or_default(),
        }
    }

    /// Deprecated owner label value, still accepted on read
    #[must_use]
    pub fn legacy_id(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Does an owner label value designate this owner?
    #[must_use]
    pub fn matches(&self, label_value: &str) -> bool {
        label_value == self.uid || label_value == self.legacy_id()
    }

    /// Diagnostic annotation value
    #[must_use]
    pub fn annotation(&self) -> String {
        json!({
            "kind": self.kind,
            "name": self.name,
            "namespace": self.namespace,
        })
        .to_string()
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Resolved content of one target Secret
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredSecret {
    pub type_: String,
    pub action: SecretAction,
    pub data: BTreeMap<String, ByteString>,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

/// Result of [`SecretReconciler::delete_if_owned`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Nothing to delete
    NotFound,
    /// Present but not provably ours, left alone
    NotOwned,
    Deleted,
}

/// Creates, updates and deletes managed Secrets
#[derive(Clone)]
pub struct SecretReconciler {
    api: Arc<dyn SecretApi>,
    owner_label: String,
}

impl std::fmt::Debug for SecretReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretReconciler")
            .field("owner_label", &self.owner_label)
            .finish_non_exhaustive()
    }
}

impl SecretReconciler {
    #[must_use]
    pub fn new(api: Arc<dyn SecretApi>, owner_label: impl Into<String>) -> Self {
        Self {
            api,
            owner_label: owner_label.into(),
        }
    }

    #[must_use]
    pub fn owner_label(&self) -> &str {
        &self.owner_label
    }

    /// Apply `desired` to Secret `name` in `namespace` on behalf of `owner`
    ///
    /// Returns the Secret as stored. An already up-to-date Secret is returned
    /// as read, with no mutating call.
    pub async fn reconcile(
        &self,
        desired: DesiredSecret,
        owner: &Owner,
        name: &str,
        namespace: &str,
    ) -> Result<Secret> {
        let mut desired = desired;
        desired
            .annotations
            .insert(self.owner_label.clone(), owner.annotation());
        desired
            .labels
            .insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
        desired
            .labels
            .insert(self.owner_label.clone(), owner.uid.clone());

        let Some(existing) = self.api.get(namespace, name).await? else {
            return self.create(&desired, owner, name, namespace).await;
        };

        self.check_ownership(&existing, owner, name, namespace)?;

        let applied = match desired.action {
            SecretAction::Patch => {
                if is_superset(&existing, &desired) {
                    debug!(secret.name = name, secret.namespace = namespace, "Secret up to date");
                    return Ok(existing);
                }
                let patch = json!({
                    "data": desired.data,
                    "metadata": {
                        "annotations": desired.annotations,
                        "labels": desired.labels,
                    },
                });
                let patched = self.api.patch(namespace, name, &patch).await?;
                if patched.is_some() {
                    observability::metrics::increment_secret_mutations("patch");
                    info!("Patched Secret {} in {} for {}", name, namespace, owner);
                }
                patched
            }
            SecretAction::Replace => {
                if is_identical(&existing, &desired) {
                    debug!(secret.name = name, secret.namespace = namespace, "Secret up to date");
                    return Ok(existing);
                }
                let mut secret = existing;
                secret.metadata.annotations = Some(desired.annotations.clone());
                secret.metadata.labels = Some(desired.labels.clone());
                secret.data = Some(desired.data.clone());
                secret.type_ = Some(desired.type_.clone());
                let replaced = self.api.replace(namespace, name, &secret).await?;
                if replaced.is_some() {
                    observability::metrics::increment_secret_mutations("replace");
                    info!("Updated Secret {} in {} for {}", name, namespace, owner);
                }
                replaced
            }
        };

        match applied {
            Some(secret) => Ok(secret),
            None => {
                debug!(
                    secret.name = name,
                    secret.namespace = namespace,
                    "Secret disappeared during update, creating"
                );
                self.create(&desired, owner, name, namespace).await
            }
        }
    }

    /// Delete Secret `name` in `namespace` if its markers prove `owner` owns it
    pub async fn delete_if_owned(
        &self,
        owner: &Owner,
        name: &str,
        namespace: &str,
    ) -> Result<DeleteOutcome> {
        let Some(existing) = self.api.get(namespace, name).await? else {
            info!(
                "Did not find Secret {} in {} while deleting for {}",
                name, namespace, owner
            );
            return Ok(DeleteOutcome::NotFound);
        };

        let labels = existing.metadata.labels.unwrap_or_default();
        let owned = labels.get(MANAGED_BY_LABEL).map(String::as_str) == Some(MANAGED_BY_VALUE)
            && labels
                .get(&self.owner_label)
                .is_some_and(|value| owner.matches(value));
        if !owned {
            warn!(
                "Did not delete Secret {} in {} for {}: {} label value mismatch",
                name, namespace, owner, self.owner_label
            );
            return Ok(DeleteOutcome::NotOwned);
        }

        if self.api.delete(namespace, name).await? {
            observability::metrics::increment_secret_deletions();
            info!("Deleted Secret {} in {} for {}", name, namespace, owner);
            Ok(DeleteOutcome::Deleted)
        } else {
            info!(
                "Did not find Secret {} in {} while deleting for {} after check",
                name, namespace, owner
            );
            Ok(DeleteOutcome::NotFound)
        }
    }

    async fn create(
        &self,
        desired: &DesiredSecret,
        owner: &Owner,
        name: &str,
        namespace: &str,
    ) -> Result<Secret> {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                annotations: Some(desired.annotations.clone()),
                labels: Some(desired.labels.clone()),
                ..ObjectMeta::default()
            },
            data: Some(desired.data.clone()),
            type_: Some(desired.type_.clone()),
            ..Secret::default()
        };
        let created = self.api.create(namespace, &secret).await?;
        observability::metrics::increment_secret_mutations("create");
        info!("Created Secret {} in {} for {}", name, namespace, owner);
        Ok(created)
    }

    fn check_ownership(
        &self,
        existing: &Secret,
        owner: &Owner,
        name: &str,
        namespace: &str,
    ) -> Result<(), SyncError> {
        let Some(labels) = existing.metadata.labels.as_ref() else {
            return Ok(());
        };
        if let Some(managed_by) = labels.get(MANAGED_BY_LABEL) {
            if managed_by != MANAGED_BY_VALUE {
                return Err(SyncError::OwnershipConflict {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                    owner: managed_by.clone(),
                });
            }
        }
        if let Some(value) = labels.get(&self.owner_label) {
            if !owner.matches(value) {
                return Err(SyncError::OwnershipConflict {
                    name: name.to_string(),
                    namespace: namespace.to_string(),
                    owner: "other BitwardenSyncConfig or BitwardenSyncSecret".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Every desired entry already present with the same value
fn contains_all<V: PartialEq>(
    existing: Option<&BTreeMap<String, V>>,
    desired: &BTreeMap<String, V>,
) -> bool {
    desired.iter().all(|(key, value)| {
        existing
            .and_then(|map| map.get(key))
            .is_some_and(|current| current == value)
    })
}

/// Change detection for `patch`: existing maps are supersets of the desired maps
fn is_superset(existing: &Secret, desired: &DesiredSecret) -> bool {
    contains_all(existing.data.as_ref(), &desired.data)
        && contains_all(existing.metadata.annotations.as_ref(), &desired.annotations)
        && contains_all(existing.metadata.labels.as_ref(), &desired.labels)
}

/// Change detection for `replace`: exact equality including type
fn is_identical(existing: &Secret, desired: &DesiredSecret) -> bool {
    existing.data.clone().unwrap_or_default() == desired.data
        && existing.metadata.annotations.clone().unwrap_or_default() == desired.annotations
        && existing.metadata.labels.clone().unwrap_or_default() == desired.labels
        && existing.type_.as_deref() == Some(desired.type_.as_str())
}
