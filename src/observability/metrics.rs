//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `bitwarden_sync_reconciliations_total{kind}` - Sync passes started
//! - `bitwarden_sync_reconciliation_errors_total{kind}` - Passes aborted before any target was synced
//! - `bitwarden_sync_reconciliation_duration_seconds{kind}` - Duration of completed passes
//! - `bitwarden_sync_secrets_total{state}` - Target results by state (synced, failed, error)
//! - `bitwarden_sync_secret_mutations_total{operation}` - Managed Secret create/replace/patch calls
//! - `bitwarden_sync_secret_deletions_total` - Managed Secrets deleted
//! - `bitwarden_sync_store_fetches_total{result}` - Store snapshot fetches
//! - `bitwarden_sync_store_fetch_duration_seconds` - Duration of store snapshot fetches
//! - `bitwarden_sync_watch_errors_total{kind}` - Watch stream errors

use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

// Metrics
static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bitwarden_sync_reconciliations_total",
            "Total number of sync passes",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bitwarden_sync_reconciliation_errors_total",
            "Total number of sync passes aborted (access token or store failures)",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "bitwarden_sync_reconciliation_duration_seconds",
            "Duration of sync passes in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static SECRETS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bitwarden_sync_secrets_total",
            "Total number of target Secret results by state",
        ),
        &["state"],
    )
    .expect("Failed to create SECRETS_TOTAL metric - this should never happen")
});

static SECRET_MUTATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bitwarden_sync_secret_mutations_total",
            "Total number of managed Secret mutations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create SECRET_MUTATIONS_TOTAL metric - this should never happen")
});

static SECRET_DELETIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "bitwarden_sync_secret_deletions_total",
        "Total number of managed Secrets deleted",
    )
    .expect("Failed to create SECRET_DELETIONS_TOTAL metric - this should never happen")
});

static STORE_FETCHES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bitwarden_sync_store_fetches_total",
            "Total number of Bitwarden snapshot fetches by result",
        ),
        &["result"],
    )
    .expect("Failed to create STORE_FETCHES_TOTAL metric - this should never happen")
});

static STORE_FETCH_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "bitwarden_sync_store_fetch_duration_seconds",
            "Duration of Bitwarden snapshot fetches in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &[],
    )
    .expect("Failed to create STORE_FETCH_DURATION metric - this should never happen")
});

static WATCH_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bitwarden_sync_watch_errors_total",
            "Total number of watch stream errors",
        ),
        &["kind"],
    )
    .expect("Failed to create WATCH_ERRORS_TOTAL metric - this should never happen")
});

/// Register all metrics with the private registry
///
/// Safe to call more than once.
pub fn register_metrics() -> Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(RECONCILIATIONS_TOTAL.clone()),
        Box::new(RECONCILIATION_ERRORS_TOTAL.clone()),
        Box::new(RECONCILIATION_DURATION.clone()),
        Box::new(SECRETS_TOTAL.clone()),
        Box::new(SECRET_MUTATIONS_TOTAL.clone()),
        Box::new(SECRET_DELETIONS_TOTAL.clone()),
        Box::new(STORE_FETCHES_TOTAL.clone()),
        Box::new(STORE_FETCH_DURATION.clone()),
        Box::new(WATCH_ERRORS_TOTAL.clone()),
    ];
    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Collect all registered metric families
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

pub fn increment_secrets_synced(state: &str) {
    SECRETS_TOTAL.with_label_values(&[state]).inc();
}

pub fn increment_secret_mutations(operation: &str) {
    SECRET_MUTATIONS_TOTAL.with_label_values(&[operation]).inc();
}

pub fn increment_secret_deletions() {
    SECRET_DELETIONS_TOTAL.inc();
}

pub fn observe_store_fetch(duration: f64, success: bool) {
    let result = if success { "success" } else { "error" };
    STORE_FETCHES_TOTAL.with_label_values(&[result]).inc();
    STORE_FETCH_DURATION
        .with_label_values(&[] as &[&str])
        .observe(duration);
}

pub fn increment_watch_errors(kind: &str) {
    WATCH_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}
