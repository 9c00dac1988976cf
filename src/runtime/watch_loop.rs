//! # Watch Loop
//!
//! Watches both custom resource kinds across all namespaces and dispatches
//! typed events to their handlers.
//!
//! Handlers run on spawned tasks so a slow cleanup never stalls the stream.
//! Events for the same object are chained: a handler starts only after the
//! previous one for that object finished.

use crate::controller::backoff::InfiniteBackoff;
use crate::controller::cache::{ObjectKey, ResourceCache};
use crate::controller::reconciler::{Context, KubeResourceApi};
use crate::controller::server::ServerState;
use crate::crd::{BitwardenSyncConfig, BitwardenSyncSecret};
use crate::runtime::error_policy::handle_watch_stream_error;
use crate::runtime::events::{classify, Classified, ResourceEvent, WatchChange};
use crate::runtime::handlers::{handle_config_event, handle_sync_secret_event, key_of};
use futures::{pin_mut, StreamExt};
use kube::api::DynamicObject;
use kube::Resource;
use kube_runtime::watcher;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Custom resource APIs watched by the loop
#[derive(Clone)]
pub struct WatchedApis {
    pub configs: KubeResourceApi,
    pub sync_secrets: KubeResourceApi,
}

impl std::fmt::Debug for WatchedApis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchedApis").finish_non_exhaustive()
    }
}

/// Run both watches until `shutdown` is cancelled
pub async fn run_watch_loop(
    ctx: Context,
    apis: WatchedApis,
    server_state: Arc<ServerState>,
    shutdown: CancellationToken,
) {
    info!("Starting watches for BitwardenSyncConfig and BitwardenSyncSecret");

    let config_handler = {
        let ctx = ctx.clone();
        let api = apis.configs.clone();
        move |event: ResourceEvent<BitwardenSyncConfig>| {
            let ctx = ctx.clone();
            let api = api.clone();
            async move { handle_config_event(&ctx, &api, event).await }
        }
    };
    let secret_handler = {
        let ctx = ctx.clone();
        let api = apis.sync_secrets.clone();
        move |event: ResourceEvent<BitwardenSyncSecret>| {
            let ctx = ctx.clone();
            let api = api.clone();
            async move { handle_sync_secret_event(&ctx, &api, event).await }
        }
    };

    let configs = watch_resources(
        "BitwardenSyncConfig",
        &apis.configs,
        ctx.configs.clone(),
        new_backoff(&ctx),
        shutdown.clone(),
        config_handler,
    );
    let sync_secrets = watch_resources(
        "BitwardenSyncSecret",
        &apis.sync_secrets,
        ctx.sync_secrets.clone(),
        new_backoff(&ctx),
        shutdown.clone(),
        secret_handler,
    );

    server_state.set_ready(true);
    tokio::join!(configs, sync_secrets);
    info!("Watches stopped");
}

fn new_backoff(ctx: &Context) -> InfiniteBackoff {
    InfiniteBackoff::new(
        ctx.config.backoff_initial_duration(),
        ctx.config.backoff_factor,
        ctx.config.backoff_max_duration(),
    )
}

/// Map a raw watcher event to a change and its object
fn watch_change(event: watcher::Event<DynamicObject>) -> Option<(WatchChange, DynamicObject)> {
    match event {
        watcher::Event::Apply(obj) => Some((WatchChange::Apply, obj)),
        watcher::Event::InitApply(obj) => Some((WatchChange::InitApply, obj)),
        watcher::Event::Delete(obj) => Some((WatchChange::Delete, obj)),
        watcher::Event::Init => {
            debug!("Watch (re)list started");
            None
        }
        watcher::Event::InitDone => {
            debug!("Watch (re)list done");
            None
        }
    }
}

/// Convert a `DynamicObject` into the typed resource
fn parse_object<K: DeserializeOwned>(obj: &DynamicObject) -> Result<K, serde_json::Error> {
    serde_json::to_value(obj).and_then(serde_json::from_value)
}

async fn watch_resources<K, H, Fut>(
    kind: &'static str,
    api: &KubeResourceApi,
    cache: Arc<dyn ResourceCache<K>>,
    mut backoff: InfiniteBackoff,
    shutdown: CancellationToken,
    handle: H,
) where
    K: Resource + DeserializeOwned + Send + Sync + 'static,
    H: Fn(ResourceEvent<K>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let stream = watcher(api.all(), watcher::Config::default());
    pin_mut!(stream);
    let mut in_flight: HashMap<ObjectKey, JoinHandle<()>> = HashMap::new();

    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => break,
            next = stream.next() => next,
        };
        let Some(result) = next else {
            warn!(resource.kind = kind, "Watch stream ended");
            break;
        };

        let event = match result {
            Ok(event) => {
                backoff.reset();
                event
            }
            Err(e) => {
                let delay = handle_watch_stream_error(kind, &format!("{e:?}"), &mut backoff);
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(delay) => continue,
                }
            }
        };

        let Some((change, raw)) = watch_change(event) else {
            continue;
        };
        let object: K = match parse_object(&raw) {
            Ok(object) => object,
            Err(e) => {
                error!(
                    resource.kind = kind,
                    resource.name = raw.metadata.name.as_deref().unwrap_or("unknown"),
                    "Failed to parse object: {}",
                    e
                );
                continue;
            }
        };
        let key = match key_of(&object) {
            Ok(key) => key,
            Err(e) => {
                error!(resource.kind = kind, "Skipping event: {}", e);
                continue;
            }
        };

        let cached = cache.get(&key).map(|entry| entry.object());
        match classify(change, object, cached.as_deref()) {
            Classified::Event(event) => {
                debug!(
                    resource.kind = kind,
                    resource.namespace = key.0.as_str(),
                    resource.name = key.1.as_str(),
                    "Dispatching {} event",
                    event.as_str()
                );
                in_flight.retain(|_, task| !task.is_finished());
                let previous = in_flight.remove(&key);
                let fut = handle(event);
                let (namespace, name) = key.clone();
                let task = tokio::spawn(async move {
                    if let Some(previous) = previous {
                        if let Err(e) = previous.await {
                            error!("Previous handler ended abnormally: {}", e);
                        }
                    }
                    if let Err(e) = fut.await {
                        error!(
                            resource.kind = kind,
                            resource.namespace = namespace.as_str(),
                            resource.name = name.as_str(),
                            "Event handler failed: {:?}",
                            e
                        );
                    }
                });
                in_flight.insert(key, task);
            }
            Classified::Refresh(object) => {
                // Never re-register an entry a delete already retired
                if let Some(entry) = cache.get(&key) {
                    entry.set_object(object);
                }
            }
            Classified::Ignore => {}
        }
    }

    for (_, task) in in_flight.drain() {
        if let Err(e) = task.await {
            error!("Event handler ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dynamic_object() {
        let raw: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "example.com/v1",
            "kind": "BitwardenSyncConfig",
            "metadata": {"name": "default", "namespace": "apps", "generation": 2},
            "spec": {"syncIntervalSeconds": 60, "targets": [{"name": "db"}]}
        }))
        .unwrap();

        let config: BitwardenSyncConfig = parse_object(&raw).unwrap();
        assert_eq!(config.metadata.name.as_deref(), Some("default"));
        assert_eq!(config.spec.sync_interval_seconds, 60);
        assert_eq!(config.spec.targets[0].name, "db");
    }

    #[test]
    fn test_watch_change_skips_markers() {
        assert!(watch_change(watcher::Event::Init).is_none());
        assert!(watch_change(watcher::Event::InitDone).is_none());

        let raw: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "example.com/v1",
            "kind": "BitwardenSyncSecret",
            "metadata": {"name": "tls", "namespace": "apps"}
        }))
        .unwrap();
        let (change, _) = watch_change(watcher::Event::Delete(raw)).unwrap();
        assert_eq!(change, WatchChange::Delete);
    }
}
