//! # Bitwarden `bws` CLI
//!
//! Runs the Bitwarden Secrets Manager CLI as a child process and parses its
//! JSON output.
//!
//! ```text
//! bws --access-token <token> --output json project list
//! bws --access-token <token> --output json secret list [<projectId>]
//! ```
//!
//! Anything on stderr is treated as a failure, even with exit code 0.

use crate::controller::error::SyncError;
use crate::provider::{SecretRecord, SecretStore, StoreProject, StoreSecret};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::{debug, warn};

const MAX_STDERR_LEN: usize = 500;

/// `SecretStore` backed by the `bws` binary
#[derive(Debug, Clone)]
pub struct BwsCli {
    command: PathBuf,
}

impl BwsCli {
    #[must_use]
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }

    async fn run<T: DeserializeOwned>(
        &self,
        access_token: &str,
        args: &[&str],
    ) -> Result<T, SyncError> {
        debug!(command = %self.command.display(), args = ?args, "Running bws");

        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.arg("--access-token")
            .arg(access_token)
            .arg("--output")
            .arg("json")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| {
            SyncError::SecretStore(format!(
                "failed to run {}: {}",
                self.command.display(),
                e
            ))
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!(exit_code = ?output.status.code(), "bws wrote to stderr");
            return Err(SyncError::SecretStore(truncate(stderr.trim())));
        }
        if !output.status.success() {
            return Err(SyncError::SecretStore(format!(
                "{} exited with {:?}",
                self.command.display(),
                output.status.code()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| SyncError::SecretStore(format!("unparsable bws output: {}", e)))
    }
}

#[async_trait]
impl SecretStore for BwsCli {
    async fn list_projects(&self, access_token: &str) -> Result<Vec<StoreProject>, SyncError> {
        self.run(access_token, &["project", "list"]).await
    }

    async fn list_secrets(
        &self,
        access_token: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<StoreSecret>, SyncError> {
        let records: Vec<SecretRecord> = match project_id {
            Some(id) => self.run(access_token, &["secret", "list", id]).await?,
            None => self.run(access_token, &["secret", "list"]).await?,
        };
        Ok(records.into_iter().map(StoreSecret::from).collect())
    }
}

fn truncate(message: &str) -> String {
    if message.chars().count() > MAX_STDERR_LEN {
        let head: String = message.chars().take(MAX_STDERR_LEN).collect();
        format!("{}... (truncated)", head)
    } else {
        message.to_string()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable shell script standing in for `bws`
    fn fake_bws(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("bws");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{}", body).unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_list_projects() {
        let dir = tempfile::tempdir().unwrap();
        let bws = BwsCli::new(fake_bws(
            &dir,
            r#"echo '[{"id":"p1","name":"prod","organizationId":"o"}]'"#,
        ));

        let projects = bws.list_projects("token").await.unwrap();
        assert_eq!(
            projects,
            vec![StoreProject {
                id: "p1".into(),
                name: "prod".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_list_secrets_passes_project_id() {
        let dir = tempfile::tempdir().unwrap();
        // $7 is the project id: --access-token t --output json secret list <id>
        let bws = BwsCli::new(fake_bws(
            &dir,
            r#"echo "[{\"id\":\"s1\",\"key\":\"db\",\"projectId\":\"$7\",\"value\":\"a: 1\"}]""#,
        ));

        let secrets = bws.list_secrets("token", Some("p9")).await.unwrap();
        assert_eq!(secrets.len(), 1);
        assert_eq!(secrets[0].project_id.as_deref(), Some("p9"));
        assert_eq!(secrets[0].value, serde_json::json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_stderr_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let bws = BwsCli::new(fake_bws(&dir, "echo '[]'; echo 'invalid token' >&2"));

        let err = bws.list_projects("token").await.unwrap_err();
        assert!(matches!(err, SyncError::SecretStore(ref msg) if msg == "invalid token"));
    }

    #[tokio::test]
    async fn test_bad_exit_and_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let bws = BwsCli::new(fake_bws(&dir, "exit 3"));
        assert!(matches!(
            bws.list_projects("token").await,
            Err(SyncError::SecretStore(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let bws = BwsCli::new(fake_bws(&dir, "echo 'not json'"));
        assert!(matches!(
            bws.list_projects("token").await,
            Err(SyncError::SecretStore(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let bws = BwsCli::new("/nonexistent/bws");
        assert!(matches!(
            bws.list_projects("token").await,
            Err(SyncError::SecretStore(_))
        ));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short"), "short");
        let long = "x".repeat(MAX_STDERR_LEN + 10);
        assert!(truncate(&long).ends_with("... (truncated)"));
    }
}
