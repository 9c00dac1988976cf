//! # Event Handlers
//!
//! One typed handler per custom resource kind.
//!
//! Create, Resume and Update register the object: finalizer, cache entry,
//! sync daemon and an immediate pass. Delete cleans up the managed Secrets
//! under the resource lock, then unregisters and releases the finalizer.
//! When cleanup fails the finalizer stays and the next relist retries.

use crate::controller::cache::{object_key, CachedResource, ObjectKey};
use crate::controller::daemon::{run_daemon, DaemonKind};
use crate::controller::reconciler::{
    delete_config_secrets, delete_sync_secret, mark_pending, sync_config, sync_secret, Context,
    MetadataApi,
};
use crate::crd::{BitwardenSyncConfig, BitwardenSyncSecret};
use crate::runtime::events::ResourceEvent;
use anyhow::{Context as _, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// (namespace, name) of a namespaced object
pub(crate) fn key_of<K: Resource>(object: &K) -> Result<ObjectKey> {
    let meta = object.meta();
    let name = meta.name.as_deref().context("object has no name")?;
    let namespace = meta
        .namespace
        .as_deref()
        .with_context(|| format!("object {name} has no namespace"))?;
    Ok(object_key(namespace, name))
}

fn has_finalizer(meta: &ObjectMeta, finalizer: &str) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == finalizer))
}

/// Add our finalizer unless present
///
/// A merge patch replaces the whole list, so the existing entries are sent too.
pub async fn add_finalizer(
    api: &dyn MetadataApi,
    key: &ObjectKey,
    meta: &ObjectMeta,
    finalizer: &str,
) -> Result<()> {
    if has_finalizer(meta, finalizer) {
        return Ok(());
    }
    let mut finalizers = meta.finalizers.clone().unwrap_or_default();
    finalizers.push(finalizer.to_string());
    api.merge_patch_metadata(&key.0, &key.1, &json!({ "metadata": { "finalizers": finalizers } }))
        .await
        .context("Failed to add finalizer")
}

/// Remove our finalizer if present
pub async fn remove_finalizer(
    api: &dyn MetadataApi,
    key: &ObjectKey,
    meta: &ObjectMeta,
    finalizer: &str,
) -> Result<()> {
    if !has_finalizer(meta, finalizer) {
        return Ok(());
    }
    let finalizers: Vec<&String> = meta
        .finalizers
        .iter()
        .flatten()
        .filter(|f| f.as_str() != finalizer)
        .collect();
    api.merge_patch_metadata(&key.0, &key.1, &json!({ "metadata": { "finalizers": finalizers } }))
        .await
        .context("Failed to remove finalizer")
}

/// Handle one `BitwardenSyncConfig` event
#[tracing::instrument(
    name = "event.config",
    skip_all,
    fields(
        event = event.as_str(),
        resource.name = tracing::field::Empty,
        resource.namespace = tracing::field::Empty
    )
)]
pub async fn handle_config_event(
    ctx: &Context,
    meta_api: &dyn MetadataApi,
    event: ResourceEvent<BitwardenSyncConfig>,
) -> Result<()> {
    let key = key_of(event.object())?;
    let span = tracing::Span::current();
    span.record("resource.namespace", key.0.as_str());
    span.record("resource.name", key.1.as_str());

    match event {
        ResourceEvent::Delete(object) => {
            ctx.daemons.stop(DaemonKind::SyncConfig, &key);
            if !has_finalizer(&object.metadata, ctx.config.finalizer()) {
                ctx.configs.remove(&key);
                return Ok(());
            }

            let cached = ctx.configs.get(&key);
            {
                let _guard = match &cached {
                    Some(entry) => Some(entry.lock().await),
                    None => None,
                };
                // The cached copy carries the status of the latest pass
                let latest = cached
                    .as_ref()
                    .map_or_else(|| Arc::new(object.clone()), |e| e.object());
                delete_config_secrets(ctx, &latest).await?;
                // Retire under the lock so no queued pass re-creates targets
                ctx.configs.remove(&key);
            }

            remove_finalizer(meta_api, &key, &object.metadata, ctx.config.finalizer()).await?;
            info!("Deleted BitwardenSyncConfig {}/{}", key.0, key.1);
            Ok(())
        }
        ResourceEvent::Create(object)
        | ResourceEvent::Resume(object)
        | ResourceEvent::Update(object) => {
            add_finalizer(meta_api, &key, &object.metadata, ctx.config.finalizer()).await?;
            let entry = ctx.configs.upsert(key.clone(), object);
            start_config_daemon(ctx, key, &entry);
            entry.wake();
            Ok(())
        }
    }
}

/// Handle one `BitwardenSyncSecret` event
#[tracing::instrument(
    name = "event.sync_secret",
    skip_all,
    fields(
        event = event.as_str(),
        resource.name = tracing::field::Empty,
        resource.namespace = tracing::field::Empty
    )
)]
pub async fn handle_sync_secret_event(
    ctx: &Context,
    meta_api: &dyn MetadataApi,
    event: ResourceEvent<BitwardenSyncSecret>,
) -> Result<()> {
    let key = key_of(event.object())?;
    let span = tracing::Span::current();
    span.record("resource.namespace", key.0.as_str());
    span.record("resource.name", key.1.as_str());

    match event {
        ResourceEvent::Delete(object) => {
            ctx.daemons.stop(DaemonKind::SyncSecret, &key);
            if !has_finalizer(&object.metadata, ctx.config.finalizer()) {
                ctx.sync_secrets.remove(&key);
                return Ok(());
            }

            let cached = ctx.sync_secrets.get(&key);
            {
                let _guard = match &cached {
                    Some(entry) => Some(entry.lock().await),
                    None => None,
                };
                delete_sync_secret(ctx, &object).await?;
                ctx.sync_secrets.remove(&key);
            }

            remove_finalizer(meta_api, &key, &object.metadata, ctx.config.finalizer()).await?;
            info!("Deleted BitwardenSyncSecret {}/{}", key.0, key.1);
            Ok(())
        }
        ResourceEvent::Create(object)
        | ResourceEvent::Resume(object)
        | ResourceEvent::Update(object) => {
            add_finalizer(meta_api, &key, &object.metadata, ctx.config.finalizer()).await?;
            let standalone = object.spec.is_standalone();
            let config_key = object.spec.config_key(&key.0);
            let entry = ctx.sync_secrets.upsert(key.clone(), object);
            entry.mark_sync_pending();

            if !standalone {
                match ctx.configs.get(&config_key) {
                    Some(config) => config.wake(),
                    None => {
                        debug!(
                            "Config {}/{} not registered, marking pending",
                            config_key.0, config_key.1
                        );
                        let _guard = entry.lock().await;
                        if let Err(e) = mark_pending(ctx, &entry).await {
                            warn!("Failed to record pending status: {:?}", e);
                        }
                    }
                }
            }

            start_sync_secret_daemon(ctx, key, &entry);
            entry.wake();
            Ok(())
        }
    }
}

fn start_config_daemon(
    ctx: &Context,
    key: ObjectKey,
    entry: &Arc<CachedResource<BitwardenSyncConfig>>,
) {
    let daemons = ctx.daemons.clone();
    let ctx = ctx.clone();
    let entry = entry.clone();
    daemons.ensure_running(DaemonKind::SyncConfig, key, move |cancel| async move {
        run_daemon(
            entry,
            cancel,
            |config: &BitwardenSyncConfig| {
                Duration::from_secs(config.spec.sync_interval_seconds)
            },
            move |entry| {
                let ctx = ctx.clone();
                async move { sync_config(&ctx, &entry).await }
            },
        )
        .await;
    });
}

fn start_sync_secret_daemon(
    ctx: &Context,
    key: ObjectKey,
    entry: &Arc<CachedResource<BitwardenSyncSecret>>,
) {
    let daemons = ctx.daemons.clone();
    let ctx = ctx.clone();
    let entry = entry.clone();
    daemons.ensure_running(DaemonKind::SyncSecret, key, move |cancel| async move {
        run_daemon(
            entry,
            cancel,
            |secret: &BitwardenSyncSecret| {
                Duration::from_secs(secret.spec.sync_interval_seconds)
            },
            move |entry| {
                let ctx = ctx.clone();
                async move { sync_secret(&ctx, &entry).await }
            },
        )
        .await;
    });
}
