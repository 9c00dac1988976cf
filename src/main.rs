//! # Bitwarden Secrets Controller
//!
//! Kubernetes controller that syncs Bitwarden Secrets Manager values into
//! managed Kubernetes Secrets.
//!
//! ## Overview
//!
//! 1. **Watching custom resources** - `BitwardenSyncConfig` and `BitwardenSyncSecret` across all namespaces
//! 2. **Fetching secrets** - Calls the `bws` CLI with the access token from a Secret
//! 3. **Resolving values** - Literal values, whole secrets or nested YAML/JSON keys
//! 4. **Managing Secrets** - Creates, replaces or patches Secrets, never touching ones it does not own
//! 5. **Recording status** - Per-Secret `synced`/`failed`/`error` state on the custom resource
//!
//! Endpoints on `METRICS_PORT` (default 8080): `/metrics`, `/healthz`, `/readyz`.

use anyhow::Result;
use bitwarden_secrets_controller::runtime::initialization::{initialize, spawn_shutdown_handler};
use bitwarden_secrets_controller::runtime::watch_loop::run_watch_loop;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    let shutdown = CancellationToken::new();
    spawn_shutdown_handler(init.server_state.clone(), shutdown.clone());

    let context = init.context.clone();
    run_watch_loop(init.context, init.apis, init.server_state, shutdown).await;

    context.daemons.shutdown().await;
    info!("Controller stopped gracefully");
    Ok(())
}
