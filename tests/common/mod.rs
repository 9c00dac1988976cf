//! Common test utilities
//!
//! In-memory fakes of the cluster and secret store seams, plus a `Context`
//! wired to them.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use bitwarden_secrets_controller::config::ControllerConfig;
use bitwarden_secrets_controller::controller::error::SyncError;
use bitwarden_secrets_controller::controller::reconciler::{
    Context, MetadataApi, SecretApi, StatusApi,
};
use bitwarden_secrets_controller::provider::{SecretStore, StoreProject, StoreSecret};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// RFC 7386 JSON merge patch
pub fn merge(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Secrets kept in a map, with counters for every mutating call
#[derive(Default)]
pub struct FakeSecretApi {
    secrets: Mutex<BTreeMap<(String, String), Secret>>,
    uid_counter: AtomicUsize,
    pub creates: AtomicUsize,
    pub replaces: AtomicUsize,
    pub patches: AtomicUsize,
    pub deletes: AtomicUsize,
    /// Next replace/patch finds the Secret gone (deleted concurrently)
    pub vanish_on_write: AtomicBool,
    /// Creating a Secret with one of these names fails with a transport error
    pub unreachable: Mutex<Vec<String>>,
}

impl FakeSecretApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, secret: Secret) {
        let key = (
            secret.metadata.namespace.clone().unwrap_or_default(),
            secret.metadata.name.clone().unwrap_or_default(),
        );
        self.secrets.lock().unwrap().insert(key, secret);
    }

    pub fn stored(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.secrets.lock().unwrap().len()
    }

    pub fn mutations(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
            + self.replaces.load(Ordering::SeqCst)
            + self.patches.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }

    fn take_vanish(&self, namespace: &str, name: &str) -> bool {
        if self.vanish_on_write.swap(false, Ordering::SeqCst) {
            self.secrets
                .lock()
                .unwrap()
                .remove(&(namespace.to_string(), name.to_string()));
            return true;
        }
        false
    }
}

#[async_trait]
impl SecretApi for FakeSecretApi {
    async fn get(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Secret>> {
        Ok(self.stored(namespace, name))
    }

    async fn create(&self, namespace: &str, secret: &Secret) -> anyhow::Result<Secret> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let name = secret.metadata.name.clone().unwrap_or_default();
        if self.unreachable.lock().unwrap().contains(&name) {
            anyhow::bail!("connection reset by peer");
        }
        let mut created = secret.clone();
        created.metadata.namespace = Some(namespace.to_string());
        let uid = self.uid_counter.fetch_add(1, Ordering::SeqCst);
        created.metadata.uid = Some(format!("secret-uid-{uid}"));
        self.insert(created.clone());
        Ok(created)
    }

    async fn replace(
        &self,
        namespace: &str,
        name: &str,
        secret: &Secret,
    ) -> anyhow::Result<Option<Secret>> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        if self.take_vanish(namespace, name) {
            return Ok(None);
        }
        self.insert(secret.clone());
        Ok(Some(secret.clone()))
    }

    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> anyhow::Result<Option<Secret>> {
        self.patches.fetch_add(1, Ordering::SeqCst);
        if self.take_vanish(namespace, name) {
            return Ok(None);
        }
        let Some(existing) = self.stored(namespace, name) else {
            return Ok(None);
        };
        let mut value = serde_json::to_value(existing)?;
        merge(&mut value, patch);
        let patched: Secret = serde_json::from_value(value)?;
        self.insert(patched.clone());
        Ok(Some(patched))
    }

    async fn delete(&self, namespace: &str, name: &str) -> anyhow::Result<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some())
    }
}

/// Status and metadata sub-resources of seeded custom resources
#[derive(Default)]
pub struct FakeResources {
    objects: Mutex<HashMap<(String, String), Value>>,
    pub status_patches: Mutex<Vec<Value>>,
    pub metadata_patches: Mutex<Vec<Value>>,
}

impl FakeResources {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed<K: Serialize>(&self, namespace: &str, name: &str, object: &K) {
        self.objects.lock().unwrap().insert(
            (namespace.to_string(), name.to_string()),
            serde_json::to_value(object).unwrap(),
        );
    }

    pub fn object(&self, namespace: &str, name: &str) -> Option<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn last_status_patch(&self) -> Option<Value> {
        self.status_patches.lock().unwrap().last().cloned()
    }

    fn apply(&self, namespace: &str, name: &str, patch: &Value) -> anyhow::Result<Value> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| anyhow::anyhow!("{namespace}/{name} not seeded"))?;
        merge(object, patch);
        Ok(object.clone())
    }
}

#[async_trait]
impl StatusApi for FakeResources {
    async fn merge_patch_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> anyhow::Result<Value> {
        self.status_patches.lock().unwrap().push(patch.clone());
        self.apply(namespace, name, patch)
    }
}

#[async_trait]
impl MetadataApi for FakeResources {
    async fn merge_patch_metadata(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> anyhow::Result<()> {
        self.metadata_patches.lock().unwrap().push(patch.clone());
        // Unseeded objects count as vanished, like a 404
        let _ = self.apply(namespace, name, patch);
        Ok(())
    }
}

/// Secret store answering from fixed lists
#[derive(Default)]
pub struct FakeStore {
    pub projects: Vec<StoreProject>,
    pub secrets: Vec<StoreSecret>,
    /// Fail every call with this `bws` error
    pub failure: Option<String>,
    pub tokens_seen: Mutex<Vec<String>>,
    pub secret_lists: AtomicUsize,
}

impl FakeStore {
    /// Store with `simple_secret` and `dict_secret`
    pub fn sample() -> Self {
        Self {
            projects: vec![StoreProject {
                id: "p-1".into(),
                name: "team".into(),
            }],
            secrets: vec![
                StoreSecret::new("s-1", "simple_secret", None, "string value"),
                StoreSecret::new(
                    "s-2",
                    "dict_secret",
                    None,
                    r#"{"key00": "dict value", "key.with.periods": "value not nested", "nested": {"key01": "nested value"}}"#,
                ),
                StoreSecret::new("s-3", "db_password", Some("p-1"), "hunter2"),
            ],
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SecretStore for FakeStore {
    async fn list_projects(&self, access_token: &str) -> Result<Vec<StoreProject>, SyncError> {
        self.tokens_seen.lock().unwrap().push(access_token.to_string());
        match &self.failure {
            Some(message) => Err(SyncError::SecretStore(message.clone())),
            None => Ok(self.projects.clone()),
        }
    }

    async fn list_secrets(
        &self,
        _access_token: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<StoreSecret>, SyncError> {
        self.secret_lists.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(SyncError::SecretStore(message.clone()));
        }
        Ok(self
            .secrets
            .iter()
            .filter(|s| project_id.is_none_or(|id| s.project_id.as_deref() == Some(id)))
            .cloned()
            .collect())
    }
}

/// Access token Secret holding `token` under `data.token`
pub fn token_secret(namespace: &str, name: &str, token: &str) -> Secret {
    let mut secret = Secret::default();
    secret.metadata.name = Some(name.to_string());
    secret.metadata.namespace = Some(namespace.to_string());
    secret.data = Some(BTreeMap::from([(
        "token".to_string(),
        ByteString(token.as_bytes().to_vec()),
    )]));
    secret
}

/// Fakes wired into a `Context`
pub struct Harness {
    pub ctx: Context,
    pub secrets: Arc<FakeSecretApi>,
    pub store: Arc<FakeStore>,
    pub configs: Arc<FakeResources>,
    pub sync_secrets: Arc<FakeResources>,
}

impl Harness {
    pub fn new(store: FakeStore) -> Self {
        let secrets = FakeSecretApi::new();
        let store = Arc::new(store);
        let configs = FakeResources::new();
        let sync_secrets = FakeResources::new();
        let ctx = Context::new(
            ControllerConfig::default(),
            secrets.clone(),
            store.clone(),
            configs.clone(),
            sync_secrets.clone(),
        );
        Self {
            ctx,
            secrets,
            store,
            configs,
            sync_secrets,
        }
    }

    pub fn owner_label(&self) -> String {
        self.ctx.config.owner_label.clone()
    }
}
