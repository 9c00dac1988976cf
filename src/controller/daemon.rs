//! # Sync Daemons
//!
//! One long-running task per registered custom resource, re-running its sync
//! pass every `syncIntervalSeconds` or as soon as it is woken.
//!
//! Each daemon owns a child of the registry's root [`CancellationToken`]:
//! [`DaemonRegistry::stop`] cancels one daemon, [`DaemonRegistry::shutdown`]
//! cancels all of them. Pass errors are logged inside the loop and never end
//! it.

use crate::controller::cache::{CachedResource, ObjectKey};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Which custom resource kind a daemon serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaemonKind {
    SyncConfig,
    SyncSecret,
}

impl DaemonKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DaemonKind::SyncConfig => "BitwardenSyncConfig",
            DaemonKind::SyncSecret => "BitwardenSyncSecret",
        }
    }
}

struct DaemonHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Running daemons by kind and object key
#[derive(Clone, Default)]
pub struct DaemonRegistry {
    daemons: Arc<Mutex<HashMap<(DaemonKind, ObjectKey), DaemonHandle>>>,
    root: CancellationToken,
}

impl std::fmt::Debug for DaemonRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonRegistry")
            .field("running", &self.running())
            .field("shutdown", &self.root.is_cancelled())
            .finish()
    }
}

impl DaemonRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a daemon unless one is already running for this key
    ///
    /// `make` receives the daemon's cancellation token. Returns true when a
    /// new daemon was spawned. Nothing is spawned after shutdown.
    pub fn ensure_running<F, Fut>(&self, kind: DaemonKind, key: ObjectKey, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.root.is_cancelled() {
            return false;
        }
        let mut daemons = self.daemons.lock().unwrap_or_else(PoisonError::into_inner);
        let daemon_key = (kind, key);
        if daemons
            .get(&daemon_key)
            .is_some_and(|handle| !handle.task.is_finished())
        {
            return false;
        }

        let cancel = self.root.child_token();
        let task = tokio::spawn(make(cancel.clone()));
        let (namespace, name) = &daemon_key.1;
        debug!(
            resource.kind = kind.as_str(),
            resource.namespace = namespace.as_str(),
            resource.name = name.as_str(),
            "Started sync daemon"
        );
        daemons.insert(daemon_key, DaemonHandle { cancel, task });
        true
    }

    /// Cancel one daemon, returning whether it was registered
    pub fn stop(&self, kind: DaemonKind, key: &ObjectKey) -> bool {
        let handle = self
            .daemons
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(kind, key.clone()));
        match handle {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_running(&self, kind: DaemonKind, key: &ObjectKey) -> bool {
        self.daemons
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind, key.clone()))
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Number of registered daemons
    #[must_use]
    pub fn running(&self) -> usize {
        self.daemons
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Cancel every daemon and wait for them to exit
    pub async fn shutdown(&self) {
        self.root.cancel();
        let handles: Vec<DaemonHandle> = self
            .daemons
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        info!("Stopping {} sync daemons", handles.len());
        for handle in handles {
            handle.cancel.cancel();
            if let Err(e) = handle.task.await {
                error!("Sync daemon ended abnormally: {}", e);
            }
        }
    }
}

/// Daemon loop for one cached resource
///
/// Waits for `interval` (re-read from the object every iteration), an early
/// wake or cancellation, then runs `pass` while holding the resource lock.
pub async fn run_daemon<K, I, P, Fut>(
    entry: Arc<CachedResource<K>>,
    cancel: CancellationToken,
    interval: I,
    pass: P,
) where
    I: Fn(&K) -> Duration,
    P: Fn(Arc<CachedResource<K>>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    loop {
        let period = interval(&entry.object()).max(Duration::from_secs(1));
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(period) => {}
            () = entry.woken() => {}
        }

        let _guard = tokio::select! {
            () = cancel.cancelled() => break,
            guard = entry.lock() => guard,
        };
        if cancel.is_cancelled() || entry.is_retired() {
            break;
        }

        if let Err(e) = pass(entry.clone()).await {
            error!(
                resource.namespace = entry.namespace(),
                resource.name = entry.name(),
                "Sync pass failed: {:?}",
                e
            );
        }
    }
    debug!(
        resource.namespace = entry.namespace(),
        resource.name = entry.name(),
        "Sync daemon stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::cache::object_key;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_daemon(
        registry: &DaemonRegistry,
        kind: DaemonKind,
        entry: Arc<CachedResource<u64>>,
        passes: Arc<AtomicUsize>,
    ) -> bool {
        let key = entry.key().clone();
        registry.ensure_running(kind, key, move |cancel| {
            run_daemon(
                entry,
                cancel,
                |secs: &u64| Duration::from_secs(*secs),
                move |_| {
                    let passes = passes.clone();
                    async move {
                        passes.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
            )
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_interval() {
        let registry = DaemonRegistry::new();
        let entry = Arc::new(CachedResource::new(object_key("ns", "a"), 10u64));
        let passes = Arc::new(AtomicUsize::new(0));

        assert!(counting_daemon(&registry, DaemonKind::SyncConfig, entry, passes.clone()));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(passes.load(Ordering::SeqCst), 2);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_runs_early() {
        let registry = DaemonRegistry::new();
        let entry = Arc::new(CachedResource::new(object_key("ns", "a"), 300u64));
        let passes = Arc::new(AtomicUsize::new(0));
        counting_daemon(&registry, DaemonKind::SyncConfig, entry.clone(), passes.clone());

        entry.wake();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(passes.load(Ordering::SeqCst), 1);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_running_is_idempotent() {
        let registry = DaemonRegistry::new();
        let entry = Arc::new(CachedResource::new(object_key("ns", "a"), 10u64));
        let passes = Arc::new(AtomicUsize::new(0));

        assert!(counting_daemon(&registry, DaemonKind::SyncConfig, entry.clone(), passes.clone()));
        assert!(!counting_daemon(&registry, DaemonKind::SyncConfig, entry.clone(), passes.clone()));
        // Same key, other kind
        assert!(counting_daemon(&registry, DaemonKind::SyncSecret, entry, passes));
        assert_eq!(registry.running(), 2);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_only_affects_one_daemon() {
        let registry = DaemonRegistry::new();
        let a = Arc::new(CachedResource::new(object_key("ns", "a"), 10u64));
        let b = Arc::new(CachedResource::new(object_key("ns", "b"), 10u64));
        let passes_a = Arc::new(AtomicUsize::new(0));
        let passes_b = Arc::new(AtomicUsize::new(0));
        counting_daemon(&registry, DaemonKind::SyncConfig, a.clone(), passes_a.clone());
        counting_daemon(&registry, DaemonKind::SyncConfig, b, passes_b.clone());

        assert!(registry.stop(DaemonKind::SyncConfig, a.key()));
        assert!(!registry.stop(DaemonKind::SyncConfig, a.key()));

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(passes_a.load(Ordering::SeqCst), 0);
        assert_eq!(passes_b.load(Ordering::SeqCst), 1);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retired_entry_ends_queued_pass() {
        let registry = DaemonRegistry::new();
        let entry = Arc::new(CachedResource::new(object_key("ns", "a"), 300u64));
        let passes = Arc::new(AtomicUsize::new(0));
        counting_daemon(&registry, DaemonKind::SyncSecret, entry.clone(), passes.clone());

        // The daemon wakes while a delete holds the lock
        let guard = entry.lock().await;
        entry.wake();
        tokio::time::sleep(Duration::from_millis(10)).await;
        entry.retire();
        drop(guard);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(passes.load(Ordering::SeqCst), 0);
        assert!(!registry.is_running(DaemonKind::SyncSecret, entry.key()));
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_spawned_after_shutdown() {
        let registry = DaemonRegistry::new();
        registry.shutdown().await;
        let entry = Arc::new(CachedResource::new(object_key("ns", "a"), 10u64));
        assert!(!counting_daemon(
            &registry,
            DaemonKind::SyncConfig,
            entry,
            Arc::new(AtomicUsize::new(0))
        ));
    }
}
