//! # Status
//!
//! Status entries and the merge patches that record them.

use crate::crd::{StatusEntry, SyncState};
use serde_json::{json, Value};

/// Entry for a target that is now in sync
#[must_use]
pub fn synced(name: &str, namespace: &str, uid: Option<String>) -> StatusEntry {
    StatusEntry {
        state: SyncState::Synced,
        uid,
        ..StatusEntry::pending(name, namespace)
    }
}

/// Entry for a target that could not be synced
///
/// Domain errors are `failed`, anything else is `error`. The message
/// carries the whole context chain.
#[must_use]
pub fn failure(name: &str, namespace: &str, err: &anyhow::Error) -> StatusEntry {
    let state = if crate::controller::error::is_domain_error(err) {
        SyncState::Failed
    } else {
        SyncState::Error
    };
    StatusEntry {
        state,
        error: Some(format!("{err:#}")),
        ..StatusEntry::pending(name, namespace)
    }
}

/// Merge patch replacing `status.secrets` of a `BitwardenSyncConfig`
///
/// Lists are replaced wholesale by a JSON merge patch.
#[must_use]
pub fn config_status_patch(entries: &[StatusEntry]) -> Value {
    json!({ "status": { "secrets": entries } })
}

/// Merge patch setting `status.secret` of a `BitwardenSyncSecret`
///
/// Unset optional fields are written as explicit nulls so values left over
/// from an earlier state (an old `error` after a successful sync) are cleared.
#[must_use]
pub fn secret_status_patch(entry: &StatusEntry) -> Value {
    json!({
        "status": {
            "secret": {
                "name": entry.name,
                "namespace": entry.namespace,
                "state": entry.state,
                "uid": entry.uid,
                "error": entry.error,
                "lastSyncTime": entry.last_sync_time,
            }
        }
    })
}
