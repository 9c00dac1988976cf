//! # Secret Store Provider
//!
//! The external secret store (Bitwarden Secrets Manager) seen as two list
//! operations, and the immutable snapshot a sync pass works from.

use crate::controller::error::SyncError;
use crate::observability;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

pub mod bitwarden;

pub use bitwarden::BwsCli;

/// Secret store able to list projects and secrets
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// List all projects visible to the access token
    async fn list_projects(&self, access_token: &str) -> Result<Vec<StoreProject>, SyncError>;

    /// List secrets, optionally restricted to one project id
    async fn list_secrets(
        &self,
        access_token: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<StoreSecret>, SyncError>;
}

/// Bitwarden project
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreProject {
    pub id: String,
    pub name: String,
}

impl std::fmt::Display for StoreProject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Secret record as printed by `bws secret list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRecord {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub value: String,
}

/// Bitwarden secret with its value parsed opportunistically
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSecret {
    pub id: String,
    pub key: String,
    pub project_id: Option<String>,
    /// Structured value, or `Value::String` holding the raw value verbatim
    pub value: Value,
}

impl StoreSecret {
    #[must_use]
    pub fn new(id: &str, key: &str, project_id: Option<&str>, raw_value: &str) -> Self {
        Self {
            id: id.to_string(),
            key: key.to_string(),
            project_id: project_id.map(str::to_string),
            value: parse_value(raw_value),
        }
    }
}

impl From<SecretRecord> for StoreSecret {
    fn from(record: SecretRecord) -> Self {
        Self {
            value: parse_value(&record.value),
            id: record.id,
            key: record.key,
            project_id: record.project_id,
        }
    }
}

impl std::fmt::Display for StoreSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.key, self.id)
    }
}

/// Parse a raw secret value as YAML (JSON included)
///
/// Strings, nulls and unparsable input keep the raw text so that values such
/// as `"  padded  "` or `key: [unclosed` survive untouched.
#[must_use]
pub fn parse_value(raw: &str) -> Value {
    match serde_yaml::from_str::<Value>(raw) {
        Ok(Value::String(_) | Value::Null) | Err(_) => Value::String(raw.to_string()),
        Ok(parsed) => parsed,
    }
}

/// Secrets and projects fetched together for one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    secrets: Vec<StoreSecret>,
    projects: Vec<StoreProject>,
}

impl StoreSnapshot {
    #[must_use]
    pub fn new(secrets: Vec<StoreSecret>, projects: Vec<StoreProject>) -> Self {
        Self { secrets, projects }
    }

    #[must_use]
    pub fn secrets(&self) -> &[StoreSecret] {
        &self.secrets
    }

    #[must_use]
    pub fn projects(&self) -> &[StoreProject] {
        &self.projects
    }

    #[must_use]
    pub fn project_by_name(&self, name: &str) -> Option<&StoreProject> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// First secret with `key`, restricted to `project_id` when given
    #[must_use]
    pub fn find_secret(&self, key: &str, project_id: Option<&str>) -> Option<&StoreSecret> {
        self.secrets.iter().find(|secret| {
            secret.key == key
                && project_id.is_none_or(|id| secret.project_id.as_deref() == Some(id))
        })
    }
}

/// Fetch a fresh snapshot
///
/// `project` is matched against project names first and otherwise used as a
/// project id.
pub async fn fetch_snapshot(
    store: &dyn SecretStore,
    access_token: &str,
    project: Option<&str>,
) -> Result<StoreSnapshot, SyncError> {
    let start = Instant::now();
    let result = async {
        let projects = store.list_projects(access_token).await?;
        let project_id = project.map(|p| {
            projects
                .iter()
                .find(|candidate| candidate.name == p)
                .map_or(p, |candidate| candidate.id.as_str())
                .to_string()
        });
        let secrets = store
            .list_secrets(access_token, project_id.as_deref())
            .await?;
        Ok(StoreSnapshot::new(secrets, projects))
    }
    .await;

    observability::metrics::observe_store_fetch(start.elapsed().as_secs_f64(), result.is_ok());
    if let Ok(snapshot) = &result {
        debug!(
            secrets = snapshot.secrets().len(),
            projects = snapshot.projects().len(),
            "Fetched Bitwarden snapshot"
        );
    }
    result
}
