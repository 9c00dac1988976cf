//! # Runtime
//!
//! Controller runtime: startup, typed events, watch loop and error policy.
//!
//! - `initialization`: rustls, logging, metrics, HTTP server and context setup
//! - `events`: typed lifecycle events classified from watcher events
//! - `handlers`: one event handler per custom resource kind
//! - `watch_loop`: watches for both kinds with per-object handler ordering
//! - `error_policy`: watch stream error classification and backoff

pub mod error_policy;
pub mod events;
pub mod handlers;
pub mod initialization;
pub mod watch_loop;
