//! # Reconciler
//!
//! Sync passes for `BitwardenSyncConfig` and `BitwardenSyncSecret` resources.
//!
//! A pass:
//! - Reads the Bitwarden access token from a Secret
//! - Fetches a fresh store snapshot through `bws`
//! - Resolves every target's sources against the snapshot
//! - Creates, replaces or patches the managed Secrets, enforcing ownership
//! - Records per-target status on the custom resource
//!
//! ## Module Structure
//!
//! - `kube_api.rs` - `SecretApi` / `StatusApi` / `MetadataApi` seams and their kube-rs implementations
//! - `secret.rs` - managed-secret reconciler and ownership checks
//! - `status.rs` - status entries and merge patches
//! - `sync_config.rs` - config pass, access token, delete handling
//! - `sync_secret.rs` - single-secret pass
//! - `types.rs` - shared `Context`

pub mod kube_api;
pub mod secret;
pub mod status;
pub mod sync_config;
pub mod sync_secret;
pub mod types;

// Re-export public API
pub use kube_api::{
    api_resource, KubeResourceApi, KubeSecretApi, MetadataApi, SecretApi, StatusApi,
};
pub use secret::{DeleteOutcome, DesiredSecret, Owner, SecretReconciler};
pub use sync_config::{delete_config_secrets, read_access_token, sync_config, sync_target};
pub use sync_secret::{
    delete_sync_secret, mark_pending, sync_for_config, sync_secret, sync_with_snapshot,
};
pub use types::Context;
