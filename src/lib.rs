//! Bitwarden Secrets Controller Library
//!
//! Keeps Kubernetes Secrets in sync with Bitwarden Secrets Manager. Two custom
//! resources declare what to sync: `BitwardenSyncConfig` (many target Secrets)
//! and `BitwardenSyncSecret` (one Secret named after the resource).
//!
//! ## Quick Start
//!
//! ```rust
//! use bitwarden_secrets_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
