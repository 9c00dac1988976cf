//! # BitwardenSyncSecret Pass
//!
//! A `BitwardenSyncSecret` produces one Secret named after itself.
//!
//! In config mode the owning `BitwardenSyncConfig` pass syncs it with the
//! config's snapshot. With `accessTokenSecretRef` set the resource is
//! standalone and fetches its own snapshot.

use crate::controller::cache::{CachedResource, ObjectKey};
use crate::controller::reconciler::status::{failure, secret_status_patch, synced};
use crate::controller::reconciler::sync_config::{fetch_with_token, sync_target};
use crate::controller::reconciler::{Context, Owner};
use crate::crd::{BitwardenSyncSecret, StatusEntry, SyncState};
use crate::observability;
use crate::provider::StoreSnapshot;
use anyhow::{Context as _, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

const KIND: &str = "BitwardenSyncSecret";

/// Sync every cached config-mode `BitwardenSyncSecret` referring to `config_key`
///
/// Each resource is locked for its sync and its sync-pending flag cleared.
pub async fn sync_for_config(ctx: &Context, config_key: &ObjectKey, snapshot: &StoreSnapshot) {
    for entry in ctx.sync_secrets.entries() {
        let object = entry.object();
        if object.spec.is_standalone() || object.spec.config_key(entry.namespace()) != *config_key {
            continue;
        }

        let _guard = entry.lock().await;
        // Deleted while this pass waited for the lock
        if entry.is_retired() || entry.object().metadata.deletion_timestamp.is_some() {
            continue;
        }
        entry.take_sync_pending();
        if let Err(e) = sync_with_snapshot(ctx, &entry, snapshot).await {
            error!(
                resource.name = entry.name(),
                resource.namespace = entry.namespace(),
                "Failed to record status: {:?}",
                e
            );
        }
    }
}

/// Reconcile the Secret of one resource with `snapshot` and record its status
pub async fn sync_with_snapshot(
    ctx: &Context,
    entry: &Arc<CachedResource<BitwardenSyncSecret>>,
    snapshot: &StoreSnapshot,
) -> Result<()> {
    let start = Instant::now();
    observability::metrics::increment_reconciliations(KIND);

    let object = entry.object();
    let owner = Owner::of(object.as_ref());
    let target = object.spec.as_target(entry.name(), entry.namespace());

    let status = match sync_target(ctx, snapshot, &target, &owner, entry.namespace()).await {
        Ok(secret) => {
            debug!("Synced {}", owner);
            synced(entry.name(), entry.namespace(), secret.metadata.uid)
        }
        Err(e) => record_failure(entry, &owner, &e),
    };
    observability::metrics::increment_secrets_synced(status.state.as_str());
    write_status(ctx, entry, &status).await?;
    observability::metrics::observe_reconciliation_duration(KIND, start.elapsed().as_secs_f64());
    Ok(())
}

/// Run one pass for a resource
///
/// Standalone: fetch a snapshot with the resource's own token and sync.
/// Config mode: while a sync is pending, wake the owning config so its next
/// pass runs now. The caller holds the resource lock.
#[tracing::instrument(
    name = "sync.secret",
    skip_all,
    fields(resource.name = entry.name(), resource.namespace = entry.namespace())
)]
pub async fn sync_secret(
    ctx: &Context,
    entry: &Arc<CachedResource<BitwardenSyncSecret>>,
) -> Result<()> {
    let object = entry.object();

    let Some(token_ref) = object.spec.access_token_secret_ref.as_ref() else {
        if entry.is_sync_pending() {
            let config_key = object.spec.config_key(entry.namespace());
            match ctx.configs.get(&config_key) {
                Some(config) => config.wake(),
                None => debug!(
                    "Config {}/{} not registered yet, sync stays pending",
                    config_key.0, config_key.1
                ),
            }
        }
        return Ok(());
    };

    let owner = Owner::of(object.as_ref());
    let project = object.spec.project.as_deref();
    match fetch_with_token(ctx, entry.namespace(), &token_ref.name, project).await {
        Ok(snapshot) => {
            entry.take_sync_pending();
            sync_with_snapshot(ctx, entry, &snapshot).await
        }
        Err(e) => {
            observability::metrics::increment_reconciliation_errors(KIND);
            let err = e.context(format!("Failed getting Bitwarden secrets for {}", owner));
            let status = record_failure(entry, &owner, &err);
            write_status(ctx, entry, &status).await
        }
    }
}

/// Record `pending` on a config-mode resource that has no status yet
pub async fn mark_pending(
    ctx: &Context,
    entry: &Arc<CachedResource<BitwardenSyncSecret>>,
) -> Result<()> {
    let has_status = entry
        .object()
        .status
        .as_ref()
        .is_some_and(|status| status.secret.is_some());
    if has_status {
        return Ok(());
    }
    write_status(ctx, entry, &StatusEntry::pending(entry.name(), entry.namespace())).await
}

/// Delete the Secret of a deleted resource if it still belongs to it
pub async fn delete_sync_secret(ctx: &Context, object: &BitwardenSyncSecret) -> Result<()> {
    let owner = Owner::of(object);
    let outcome = ctx
        .secrets
        .delete_if_owned(&owner, &owner.name, &owner.namespace)
        .await
        .with_context(|| format!("Failed to delete Secret for {}", owner))?;
    info!("Handled delete of {}: {:?}", owner, outcome);
    Ok(())
}

fn record_failure(
    entry: &CachedResource<BitwardenSyncSecret>,
    owner: &Owner,
    err: &anyhow::Error,
) -> StatusEntry {
    let status = failure(entry.name(), entry.namespace(), err);
    if status.state == SyncState::Failed {
        error!("Failed to sync {}: {}", owner, err);
    } else {
        error!("Error syncing {}: {:?}", owner, err);
    }
    status
}

async fn write_status(
    ctx: &Context,
    entry: &CachedResource<BitwardenSyncSecret>,
    status: &StatusEntry,
) -> Result<()> {
    entry
        .merge_patch_status(ctx.secret_status.as_ref(), &secret_status_patch(status))
        .await
        .context("Failed to update BitwardenSyncSecret status")
}
