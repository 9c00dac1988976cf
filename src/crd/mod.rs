//! # Custom Resource Definitions
//!
//! CRD types for the Bitwarden Secrets Controller.
//!
//! ## Module Structure
//!
//! - `sync_config.rs` - `BitwardenSyncConfig`, many targets per resource
//! - `sync_secret.rs` - `BitwardenSyncSecret`, a single target named after the resource
//! - `source.rs` - targets and secret sources shared by both kinds
//! - `status.rs` - per-target status entries

mod source;
mod status;
mod sync_config;
mod sync_secret;

pub use source::{AccessTokenSecretRef, SecretAction, SecretSource, Target};
pub use status::{BitwardenSyncConfigStatus, BitwardenSyncSecretStatus, StatusEntry, SyncState};
pub use sync_config::{BitwardenSyncConfig, BitwardenSyncConfigSpec};
pub use sync_secret::{BitwardenSyncSecret, BitwardenSyncSecretSpec, SyncConfigRef};

/// Default value for boolean true
pub fn default_true() -> bool {
    true
}

/// Default Secret type
pub fn default_secret_type() -> String {
    crate::constants::DEFAULT_SECRET_TYPE.to_string()
}

/// Default sync interval of `BitwardenSyncConfig`
pub fn default_config_sync_interval() -> u64 {
    crate::constants::DEFAULT_CONFIG_SYNC_INTERVAL_SECS
}

/// Default sync interval of `BitwardenSyncSecret`
pub fn default_secret_sync_interval() -> u64 {
    crate::constants::DEFAULT_SECRET_SYNC_INTERVAL_SECS
}

/// Default config referenced by `BitwardenSyncSecret`
pub fn default_sync_config_name() -> String {
    crate::constants::DEFAULT_SYNC_CONFIG_NAME.to_string()
}
