//! # Error Policy
//!
//! Watch stream error handling. Errors never end a watch: each one is
//! classified, logged and followed by the next [`InfiniteBackoff`] delay.

use crate::controller::backoff::InfiniteBackoff;
use crate::observability;
use std::time::Duration;
use tracing::{error, warn};

/// Coarse class of a watch stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401/403, RBAC revoked or token expired
    Unauthorized,
    /// 410, resource version too old; the watcher relists on its own
    Expired,
    /// 429 or API server storage reinitializing
    Throttled,
    /// 404, usually the CRD is not installed
    NotFound,
    Other,
}

impl WatchErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchErrorKind::Unauthorized => "unauthorized",
            WatchErrorKind::Expired => "expired",
            WatchErrorKind::Throttled => "throttled",
            WatchErrorKind::NotFound => "not_found",
            WatchErrorKind::Other => "other",
        }
    }
}

/// Classify a watch error from its debug rendering
///
/// 404 is checked first: a plain-text 404 body surfaces as a serde error whose
/// chain also mentions the failed watch.
#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    if is_not_found {
        return WatchErrorKind::NotFound;
    }
    if error_string.contains("401")
        || error_string.contains("403")
        || error_string.contains("Unauthorized")
        || error_string.contains("Forbidden")
    {
        return WatchErrorKind::Unauthorized;
    }
    if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        return WatchErrorKind::Expired;
    }
    if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        return WatchErrorKind::Throttled;
    }
    WatchErrorKind::Other
}

/// Log a watch stream error and return how long to wait before polling again
pub fn handle_watch_stream_error(
    resource_kind: &str,
    error_string: &str,
    backoff: &mut InfiniteBackoff,
) -> Duration {
    let kind = classify_watch_error(error_string);
    observability::metrics::increment_watch_errors(resource_kind);
    let delay = backoff.next_delay();

    match kind {
        WatchErrorKind::Unauthorized => {
            error!(
                resource.kind = resource_kind,
                "Watch authentication failed, check the controller's ClusterRole and ServiceAccount: {}",
                error_string
            );
        }
        WatchErrorKind::NotFound => {
            error!(
                resource.kind = resource_kind,
                "Watched resource not found, is the {} CRD installed? {}",
                resource_kind,
                error_string
            );
        }
        WatchErrorKind::Expired => {
            warn!(
                resource.kind = resource_kind,
                "Watch resource version expired, relisting"
            );
        }
        WatchErrorKind::Throttled => {
            warn!(
                resource.kind = resource_kind,
                "API server throttling or reinitializing storage: {}",
                error_string
            );
        }
        WatchErrorKind::Other => {
            error!(
                resource.kind = resource_kind,
                "Watch stream error: {}",
                error_string
            );
        }
    }

    warn!(
        resource.kind = resource_kind,
        error_type = kind.as_str(),
        "Retrying watch in {}ms",
        delay.as_millis()
    );
    delay
}
