//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use bitwarden_secrets_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Secret store
pub use crate::provider::{BwsCli, SecretStore, StoreProject, StoreSecret, StoreSnapshot};

// Sync passes and their seams
pub use crate::controller::reconciler::{
    Context, DesiredSecret, MetadataApi, Owner, SecretApi, SecretReconciler, StatusApi,
};

// Cache and daemons
pub use crate::controller::cache::{InMemoryCache, ObjectKey, ResourceCache};
pub use crate::controller::daemon::{DaemonKind, DaemonRegistry};

// Config
pub use crate::config::ControllerConfig;

// Errors
pub use crate::controller::error::{ResolutionError, SyncError};
