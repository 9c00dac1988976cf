//! # BitwardenSyncConfig Pass
//!
//! One pass over a config:
//! 1. Read the access token and fetch a fresh snapshot. Failure aborts the
//!    pass and leaves the status untouched.
//! 2. Resolve and reconcile every target, recording `synced`, `failed` or
//!    `error` per target.
//! 3. Delete Secrets recorded in the previous status but no longer declared.
//! 4. Merge-patch `status.secrets`.
//! 5. Sync the `BitwardenSyncSecret`s driven by this config with the same
//!    snapshot.

use crate::constants::ACCESS_TOKEN_DATA_KEY;
use crate::controller::cache::CachedResource;
use crate::controller::error::SyncError;
use crate::controller::reconciler::status::{config_status_patch, failure, synced};
use crate::controller::reconciler::sync_secret::sync_for_config;
use crate::controller::reconciler::{Context, DesiredSecret, Owner, SecretApi};
use crate::controller::resolver::{resolve_data, resolve_strings};
use crate::crd::{BitwardenSyncConfig, StatusEntry, SyncState, Target};
use crate::observability;
use crate::provider::{fetch_snapshot, StoreSnapshot};
use anyhow::{Context as _, Result};
use k8s_openapi::api::core::v1::Secret;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

const KIND: &str = "BitwardenSyncConfig";

/// Read the store access token from `data.token` of Secret `name`
pub async fn read_access_token(
    api: &dyn SecretApi,
    namespace: &str,
    name: &str,
) -> Result<Zeroizing<String>> {
    let secret = api
        .get(namespace, name)
        .await?
        .ok_or_else(|| SyncError::AccessTokenSecretNotFound(name.to_string()))?;
    let token = secret
        .data
        .as_ref()
        .and_then(|data| data.get(ACCESS_TOKEN_DATA_KEY))
        .ok_or_else(|| SyncError::AccessTokenMissing(name.to_string()))?;
    let token = Zeroizing::new(String::from_utf8_lossy(&token.0).trim().to_string());
    if token.is_empty() {
        return Err(SyncError::AccessTokenMissing(name.to_string()).into());
    }
    Ok(token)
}

/// Read the token from `token_secret` and fetch a snapshot scoped to `project`
pub async fn fetch_with_token(
    ctx: &Context,
    namespace: &str,
    token_secret: &str,
    project: Option<&str>,
) -> Result<StoreSnapshot> {
    let token = read_access_token(ctx.secret_api.as_ref(), namespace, token_secret).await?;
    Ok(fetch_snapshot(ctx.store.as_ref(), &token, project).await?)
}

/// Resolve a target against `snapshot` and reconcile its Secret in `namespace`
pub async fn sync_target(
    ctx: &Context,
    snapshot: &StoreSnapshot,
    target: &Target,
    owner: &Owner,
    namespace: &str,
) -> Result<Secret> {
    let desired = DesiredSecret {
        type_: target.type_.clone(),
        action: target.action,
        data: resolve_data(&target.data, snapshot)?,
        annotations: resolve_strings(&target.annotations, snapshot)?,
        labels: resolve_strings(&target.labels, snapshot)?,
    };
    ctx.secrets
        .reconcile(desired, owner, &target.name, namespace)
        .await
}

/// Run one pass over a config
///
/// The caller holds the resource lock.
#[tracing::instrument(
    name = "sync.config",
    skip_all,
    fields(resource.name = entry.name(), resource.namespace = entry.namespace())
)]
pub async fn sync_config(
    ctx: &Context,
    entry: &Arc<CachedResource<BitwardenSyncConfig>>,
) -> Result<()> {
    let start = Instant::now();
    observability::metrics::increment_reconciliations(KIND);

    let config = entry.object();
    let owner = Owner::of(config.as_ref());
    let namespace = entry.namespace();

    let token_secret = config
        .spec
        .access_token_secret_ref
        .as_ref()
        .map_or(ctx.config.access_token_secret_name.as_str(), |r| r.name.as_str());
    let project = config.spec.project.as_deref();
    let snapshot = match fetch_with_token(ctx, namespace, token_secret, project).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            observability::metrics::increment_reconciliation_errors(KIND);
            return Err(e.context(format!("Failed getting Bitwarden secrets for {}", owner)));
        }
    };

    let mut entries: Vec<StatusEntry> = Vec::with_capacity(config.spec.targets.len());
    for target in &config.spec.targets {
        let target_namespace = target.namespace.as_deref().unwrap_or(namespace);
        let status = match sync_target(ctx, &snapshot, target, &owner, target_namespace).await {
            Ok(secret) => synced(&target.name, target_namespace, secret.metadata.uid),
            Err(e) => {
                let status = failure(&target.name, target_namespace, &e);
                if status.state == SyncState::Failed {
                    error!(
                        "Failed to sync Secret {} in {} for {}: {}",
                        target.name, target_namespace, owner, e
                    );
                } else {
                    error!(
                        "Error syncing Secret {} in {} for {}: {:?}",
                        target.name, target_namespace, owner, e
                    );
                }
                status
            }
        };
        observability::metrics::increment_secrets_synced(status.state.as_str());
        entries.push(status);
    }

    let previous = config
        .status
        .as_ref()
        .map(|status| status.secrets.as_slice())
        .unwrap_or_default();
    for stale in previous
        .iter()
        .filter(|old| !entries.iter().any(|new| new.refers_to(&old.name, &old.namespace)))
    {
        if let Err(e) = ctx
            .secrets
            .delete_if_owned(&owner, &stale.name, &stale.namespace)
            .await
        {
            warn!(
                "Failed to delete Secret {} in {} removed from {}: {:?}",
                stale.name, stale.namespace, owner, e
            );
        }
    }

    entry
        .merge_patch_status(ctx.config_status.as_ref(), &config_status_patch(&entries))
        .await
        .context("Failed to update BitwardenSyncConfig status")?;

    sync_for_config(ctx, entry.key(), &snapshot).await;

    observability::metrics::observe_reconciliation_duration(KIND, start.elapsed().as_secs_f64());
    info!(
        targets = entries.len(),
        synced = entries.iter().filter(|e| e.state == SyncState::Synced).count(),
        "Synced {}",
        owner
    );
    Ok(())
}

/// Delete every Secret recorded in the status of a deleted config
pub async fn delete_config_secrets(ctx: &Context, config: &BitwardenSyncConfig) -> Result<()> {
    let owner = Owner::of(config);
    let Some(status) = config.status.as_ref() else {
        return Ok(());
    };
    for recorded in &status.secrets {
        ctx.secrets
            .delete_if_owned(&owner, &recorded.name, &recorded.namespace)
            .await
            .with_context(|| {
                format!(
                    "Failed to delete Secret {} in {} for {}",
                    recorded.name, recorded.namespace, owner
                )
            })?;
    }
    Ok(())
}
