//! # Observability
//!
//! Logging and Prometheus metrics for the controller.
//!
//! - `logging`: tracing subscriber setup (text or JSON)
//! - `metrics`: Prometheus counters and histograms served on `/metrics`

pub mod logging;
pub mod metrics;

pub use metrics::*;
