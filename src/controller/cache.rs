//! # Resource Lifecycle Cache
//!
//! In-process registry of live custom resources.
//!
//! Each entry carries the latest known object plus the coordination state a
//! daemon needs: an async reconcile lock held across a full pass, a
//! sync-pending flag and an early wake-up signal. Upserting an existing key
//! refreshes the object in place and keeps that state, so a running daemon
//! keeps its handle.
//!
//! Removing an entry retires its handle. A pass that was queued on the lock
//! of a retired handle must not touch the cluster any more.

use crate::controller::reconciler::StatusApi;
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, Notify};

/// (namespace, name) of a namespaced object
pub type ObjectKey = (String, String);

/// Build an [`ObjectKey`]
#[must_use]
pub fn object_key(namespace: &str, name: &str) -> ObjectKey {
    (namespace.to_string(), name.to_string())
}

/// Registry of live custom resources of one kind
pub trait ResourceCache<K>: Send + Sync {
    /// Insert or refresh an entry, returning its handle
    fn upsert(&self, key: ObjectKey, object: K) -> Arc<CachedResource<K>>;

    /// Drop and retire an entry, returning its handle if it was present
    fn remove(&self, key: &ObjectKey) -> Option<Arc<CachedResource<K>>>;

    fn get(&self, key: &ObjectKey) -> Option<Arc<CachedResource<K>>>;

    /// Snapshot of all entries
    fn entries(&self) -> Vec<Arc<CachedResource<K>>>;
}

/// One cached custom resource
pub struct CachedResource<K> {
    key: ObjectKey,
    object: RwLock<Arc<K>>,
    reconcile_lock: AsyncMutex<()>,
    sync_pending: AtomicBool,
    retired: AtomicBool,
    wake: Notify,
}

impl<K> std::fmt::Debug for CachedResource<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedResource")
            .field("key", &self.key)
            .field("sync_pending", &self.sync_pending.load(Ordering::Relaxed))
            .field("retired", &self.retired.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<K> CachedResource<K> {
    #[must_use]
    pub fn new(key: ObjectKey, object: K) -> Self {
        Self {
            key,
            object: RwLock::new(Arc::new(object)),
            reconcile_lock: AsyncMutex::new(()),
            sync_pending: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.key.0
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.key.1
    }

    /// Latest known object
    #[must_use]
    pub fn object(&self) -> Arc<K> {
        self.object
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the object, keeping lock, flag and wake signal
    pub fn set_object(&self, object: K) {
        *self
            .object
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(object);
    }

    /// Serialize passes over this resource
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.reconcile_lock.lock().await
    }

    pub fn mark_sync_pending(&self) {
        self.sync_pending.store(true, Ordering::SeqCst);
    }

    /// Clear the sync-pending flag, returning its previous value
    pub fn take_sync_pending(&self) -> bool {
        self.sync_pending.swap(false, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_sync_pending(&self) -> bool {
        self.sync_pending.load(Ordering::SeqCst)
    }

    /// Mark the handle as dropped from its cache
    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    /// Whether the resource was removed from its cache
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Ask the daemon to run its next pass now
    ///
    /// A wake with no daemon waiting is remembered until the next wait.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Wait for [`wake`](Self::wake)
    pub async fn woken(&self) {
        self.wake.notified().await;
    }
}

impl<K: DeserializeOwned> CachedResource<K> {
    /// JSON merge patch the status and refresh the cached object from the response
    pub async fn merge_patch_status(&self, api: &dyn StatusApi, patch: &Value) -> Result<()> {
        let updated = api
            .merge_patch_status(self.namespace(), self.name(), patch)
            .await?;
        self.set_object(serde_json::from_value(updated)?);
        Ok(())
    }
}

/// `HashMap`-backed [`ResourceCache`]
pub struct InMemoryCache<K> {
    entries: Mutex<HashMap<ObjectKey, Arc<CachedResource<K>>>>,
}

impl<K> std::fmt::Debug for InMemoryCache<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("entries", &self.entries_guard().len())
            .finish()
    }
}

impl<K> Default for InMemoryCache<K> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> InMemoryCache<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries_guard(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<ObjectKey, Arc<CachedResource<K>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K: Send + Sync> ResourceCache<K> for InMemoryCache<K> {
    fn upsert(&self, key: ObjectKey, object: K) -> Arc<CachedResource<K>> {
        let mut entries = self.entries_guard();
        match entries.get(&key) {
            Some(existing) => {
                existing.set_object(object);
                existing.clone()
            }
            None => {
                let entry = Arc::new(CachedResource::new(key.clone(), object));
                entries.insert(key, entry.clone());
                entry
            }
        }
    }

    fn remove(&self, key: &ObjectKey) -> Option<Arc<CachedResource<K>>> {
        let removed = self.entries_guard().remove(key);
        if let Some(entry) = &removed {
            entry.retire();
        }
        removed
    }

    fn get(&self, key: &ObjectKey) -> Option<Arc<CachedResource<K>>> {
        self.entries_guard().get(key).cloned()
    }

    fn entries(&self) -> Vec<Arc<CachedResource<K>>> {
        self.entries_guard().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    #[test]
    fn test_upsert_refreshes_in_place() {
        let cache: InMemoryCache<String> = InMemoryCache::new();
        let key = object_key("ns", "a");

        let first = cache.upsert(key.clone(), "v1".to_string());
        first.mark_sync_pending();
        let second = cache.upsert(key.clone(), "v2".to_string());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first.object(), "v2");
        assert!(second.is_sync_pending());
        assert_eq!(cache.entries().len(), 1);
    }

    #[test]
    fn test_remove() {
        let cache: InMemoryCache<u32> = InMemoryCache::new();
        let key = object_key("ns", "a");
        cache.upsert(key.clone(), 1);

        let live = cache.get(&key).unwrap();
        assert!(!live.is_retired());

        assert!(cache.remove(&key).is_some());
        assert!(live.is_retired());
        assert!(cache.get(&key).is_none());
        assert!(cache.remove(&key).is_none());

        // A new registration under the same key starts fresh
        assert!(!cache.upsert(key, 2).is_retired());
    }

    #[test]
    fn test_debug_shows_size() {
        let cache: InMemoryCache<u32> = InMemoryCache::new();
        cache.upsert(object_key("ns", "a"), 1);
        assert_eq!(format!("{cache:?}"), "InMemoryCache { entries: 1 }");
    }

    #[test]
    fn test_take_sync_pending() {
        let entry = CachedResource::new(object_key("ns", "a"), ());
        assert!(!entry.take_sync_pending());
        entry.mark_sync_pending();
        assert!(entry.take_sync_pending());
        assert!(!entry.is_sync_pending());
    }

    #[tokio::test]
    async fn test_wake_before_wait_is_remembered() {
        let entry = CachedResource::new(object_key("ns", "a"), ());
        entry.wake();
        tokio::time::timeout(Duration::from_secs(1), entry.woken())
            .await
            .expect("stored wake permit");
    }

    #[tokio::test]
    async fn test_lock_serializes() {
        let entry = Arc::new(CachedResource::new(object_key("ns", "a"), ()));
        let guard = entry.lock().await;
        let other = entry.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.lock().await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }

    struct EchoStatus;

    #[async_trait]
    impl StatusApi for EchoStatus {
        async fn merge_patch_status(
            &self,
            namespace: &str,
            name: &str,
            patch: &Value,
        ) -> Result<Value> {
            Ok(serde_json::json!({
                "namespace": namespace,
                "name": name,
                "status": patch["status"].clone(),
            }))
        }
    }

    #[tokio::test]
    async fn test_merge_patch_status_refreshes_object() {
        let entry = CachedResource::new(object_key("ns", "a"), serde_json::json!({}));
        entry
            .merge_patch_status(&EchoStatus, &serde_json::json!({"status": {"x": 1}}))
            .await
            .unwrap();
        assert_eq!(
            *entry.object(),
            serde_json::json!({"namespace": "ns", "name": "a", "status": {"x": 1}})
        );
    }
}
