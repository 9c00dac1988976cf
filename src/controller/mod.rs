//! # Controller
//!
//! Core controller modules for the Bitwarden Secrets Controller.
//!
//! - `backoff`: Infinite capped exponential backoff for watch retries
//! - `cache`: In-process registry of live custom resources
//! - `daemon`: Per-resource sync daemons with cancellation
//! - `error`: Domain errors
//! - `reconciler`: Sync passes and managed-secret reconciliation
//! - `resolver`: Secret source resolution against a store snapshot
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod cache;
pub mod daemon;
pub mod error;
pub mod reconciler;
pub mod resolver;
pub mod server;
