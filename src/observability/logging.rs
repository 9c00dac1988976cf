//! # Logging
//!
//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence when set. Otherwise `LOG_LEVEL` applies to the
//! controller crate and noisy dependencies stay at `warn`.

use crate::config::ControllerConfig;
use tracing_subscriber::EnvFilter;

/// Filter directives used when `RUST_LOG` is not set
#[must_use]
pub fn default_directives(log_level: &str) -> String {
    let level = match log_level.to_ascii_lowercase().as_str() {
        "error" => "error",
        "warn" | "warning" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };
    format!("warn,bitwarden_secrets_controller={level}")
}

/// Install the global tracing subscriber
///
/// A second call (tests, embedding) is a no-op apart from a warning.
pub fn init(config: &ControllerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    let result = if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    if let Err(e) = result {
        tracing::warn!("Tracing subscriber already initialized: {}", e);
    }
}
