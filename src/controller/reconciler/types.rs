//! # Types
//!
//! Shared context of all sync passes.

use crate::config::ControllerConfig;
use crate::controller::cache::{InMemoryCache, ResourceCache};
use crate::controller::daemon::DaemonRegistry;
use crate::controller::reconciler::{SecretApi, SecretReconciler, StatusApi};
use crate::crd::{BitwardenSyncConfig, BitwardenSyncSecret};
use crate::provider::SecretStore;
use std::sync::Arc;

/// Everything a pass needs, built once at startup and shared by all tasks
#[derive(Clone)]
pub struct Context {
    pub config: Arc<ControllerConfig>,
    /// Raw Secret access (access tokens)
    pub secret_api: Arc<dyn SecretApi>,
    /// Managed Secret create/update/delete
    pub secrets: SecretReconciler,
    pub store: Arc<dyn SecretStore>,
    pub config_status: Arc<dyn StatusApi>,
    pub secret_status: Arc<dyn StatusApi>,
    pub configs: Arc<dyn ResourceCache<BitwardenSyncConfig>>,
    pub sync_secrets: Arc<dyn ResourceCache<BitwardenSyncSecret>>,
    pub daemons: DaemonRegistry,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("configs", &self.configs.entries().len())
            .field("sync_secrets", &self.sync_secrets.entries().len())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Build a context with empty in-memory caches
    #[must_use]
    pub fn new(
        config: ControllerConfig,
        secret_api: Arc<dyn SecretApi>,
        store: Arc<dyn SecretStore>,
        config_status: Arc<dyn StatusApi>,
        secret_status: Arc<dyn StatusApi>,
    ) -> Self {
        let secrets = SecretReconciler::new(secret_api.clone(), config.owner_label.clone());
        Self {
            config: Arc::new(config),
            secret_api,
            secrets,
            store,
            config_status,
            secret_status,
            configs: Arc::new(InMemoryCache::new()),
            sync_secrets: Arc::new(InMemoryCache::new()),
            daemons: DaemonRegistry::new(),
        }
    }
}
