//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default operator domain, used as the API group and as the finalizer name
pub const DEFAULT_OPERATOR_DOMAIN: &str = "bitwarden-k8s-secrets-manager.demo.redhat.com";

/// Default API version of the custom resources
pub const DEFAULT_OPERATOR_VERSION: &str = "v1";

/// Default secret-store command (Bitwarden Secrets Manager CLI)
pub const DEFAULT_BWS_CMD: &str = "bws";

/// Default name of the access token Secret when a resource does not name one
pub const DEFAULT_ACCESS_TOKEN_SECRET_NAME: &str = "bitwarden-access-token";

/// Key inside the access token Secret holding the token
pub const ACCESS_TOKEN_DATA_KEY: &str = "token";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Label marking a Secret as managed by this controller
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on Secrets this controller owns
pub const MANAGED_BY_VALUE: &str = "secrets-manager";

/// Default sync interval of a `BitwardenSyncConfig` (seconds)
pub const DEFAULT_CONFIG_SYNC_INTERVAL_SECS: u64 = 300;

/// Default sync interval of a `BitwardenSyncSecret` (seconds)
pub const DEFAULT_SECRET_SYNC_INTERVAL_SECS: u64 = 30;

/// Default Secret type for targets
pub const DEFAULT_SECRET_TYPE: &str = "Opaque";

/// Config name a `BitwardenSyncSecret` uses when it does not reference one
pub const DEFAULT_SYNC_CONFIG_NAME: &str = "default";

/// Watch backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 100;

/// Watch backoff scaling factor
pub const DEFAULT_BACKOFF_FACTOR: u32 = 2;

/// Watch backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;

/// Service-account namespace file mounted into in-cluster pods
pub const SERVICE_ACCOUNT_NAMESPACE_FILE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// How long startup waits for the HTTP server to bind (seconds)
pub const SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Poll interval while waiting for the HTTP server (milliseconds)
pub const SERVER_POLL_INTERVAL_MS: u64 = 50;
