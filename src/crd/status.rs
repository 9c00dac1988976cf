//! # Status
//!
//! Status types recorded on both custom resources.

use serde::{Deserialize, Serialize};

/// Sync state of one managed Secret
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Not synced yet
    #[default]
    Pending,
    /// Secret matches the store
    Synced,
    /// Expected, user-fixable failure (bad reference, ownership conflict, ...)
    Failed,
    /// Unexpected fault
    Error,
}

impl SyncState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Synced => "synced",
            SyncState::Failed => "failed",
            SyncState::Error => "error",
        }
    }
}

/// Status of one target Secret
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub state: SyncState,
    /// UID of the managed Secret once synced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Error message for failed/error states
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time of the pass that produced this entry (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<String>,
}

impl StatusEntry {
    #[must_use]
    pub fn pending(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            state: SyncState::Pending,
            last_sync_time: Some(chrono::Utc::now().to_rfc3339()),
            ..Self::default()
        }
    }

    /// Same target (name and namespace)
    #[must_use]
    pub fn refers_to(&self, name: &str, namespace: &str) -> bool {
        self.name == name && self.namespace == namespace
    }
}

/// Status of a `BitwardenSyncConfig`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BitwardenSyncConfigStatus {
    /// One entry per target of the last pass
    #[serde(default)]
    pub secrets: Vec<StatusEntry>,
}

/// Status of a `BitwardenSyncSecret`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BitwardenSyncSecretStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<StatusEntry>,
}
