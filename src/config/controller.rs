//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Operator identity domain
    /// Used as the API group of both custom resources and as the finalizer name
    pub operator_domain: String,
    /// API version of the custom resources
    pub operator_version: String,
    /// Namespace the controller runs in
    pub operator_namespace: String,
    /// Path of the Bitwarden Secrets Manager CLI
    pub bws_cmd: String,
    /// Label (and annotation) key carrying the owner identity on managed Secrets
    pub owner_label: String,
    /// Access token Secret name used when a resource does not set one
    pub access_token_secret_name: String,
    /// HTTP server port for metrics and probes
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Watch backoff starting value (milliseconds)
    pub backoff_initial_ms: u64,
    /// Watch backoff scaling factor
    pub backoff_factor: u32,
    /// Watch backoff maximum value (milliseconds)
    pub backoff_max_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            operator_domain: DEFAULT_OPERATOR_DOMAIN.to_string(),
            operator_version: DEFAULT_OPERATOR_VERSION.to_string(),
            operator_namespace: "default".to_string(),
            bws_cmd: DEFAULT_BWS_CMD.to_string(),
            owner_label: format!("{DEFAULT_OPERATOR_DOMAIN}/config"),
            access_token_secret_name: DEFAULT_ACCESS_TOKEN_SECRET_NAME.to_string(),
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
            log_format: "text".to_string(),
            backoff_initial_ms: DEFAULT_BACKOFF_INITIAL_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    ///
    /// `from_env` delegates here; tests pass a map instead of mutating the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        use crate::constants::*;

        let operator_domain = lookup("OPERATOR_DOMAIN")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_OPERATOR_DOMAIN.to_string());
        let owner_label = lookup("MANAGED_SECRET_LABEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| format!("{operator_domain}/config"));
        let operator_namespace = lookup("OPERATOR_NAMESPACE")
            .or_else(|| lookup("POD_NAMESPACE"))
            .or_else(read_service_account_namespace)
            .unwrap_or_else(|| "default".to_string());

        Self {
            operator_version: lookup_or_default_str(
                &lookup,
                "OPERATOR_VERSION",
                DEFAULT_OPERATOR_VERSION,
            ),
            operator_namespace,
            bws_cmd: lookup_or_default_str(&lookup, "BWS_CMD", DEFAULT_BWS_CMD),
            owner_label,
            access_token_secret_name: lookup_or_default_str(
                &lookup,
                "ACCESS_TOKEN_SECRET_NAME",
                DEFAULT_ACCESS_TOKEN_SECRET_NAME,
            ),
            metrics_port: lookup_or_default(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            log_level: lookup_or_default_str(&lookup, "LOG_LEVEL", "INFO"),
            log_format: lookup_or_default_str(&lookup, "LOG_FORMAT", "text"),
            backoff_initial_ms: lookup_or_default(
                &lookup,
                "BACKOFF_INITIAL_MS",
                DEFAULT_BACKOFF_INITIAL_MS,
            ),
            backoff_factor: lookup_or_default(&lookup, "BACKOFF_FACTOR", DEFAULT_BACKOFF_FACTOR),
            backoff_max_ms: lookup_or_default(&lookup, "BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            operator_domain,
        }
    }

    /// Finalizer placed on every custom resource this controller handles
    pub fn finalizer(&self) -> &str {
        &self.operator_domain
    }

    /// Get backoff start duration
    pub fn backoff_initial_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    /// Get backoff max duration
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

fn read_service_account_namespace() -> Option<String> {
    std::fs::read_to_string(crate::constants::SERVICE_ACCOUNT_NAMESPACE_FILE)
        .ok()
        .map(|ns| ns.trim().to_string())
        .filter(|ns| !ns.is_empty())
}

/// Read variable or return default value
fn lookup_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read variable as string or return default
fn lookup_or_default_str<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
