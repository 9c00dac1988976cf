//! # Initialization
//!
//! Controller startup: rustls provider, logging, metrics, HTTP server,
//! Kubernetes client and the shared sync context.

use crate::config::ControllerConfig;
use crate::constants::{SERVER_POLL_INTERVAL_MS, SERVER_STARTUP_TIMEOUT_SECS};
use crate::controller::reconciler::{api_resource, Context, KubeResourceApi, KubeSecretApi};
use crate::controller::server::{start_server, ServerState};
use crate::observability;
use crate::provider::BwsCli;
use crate::runtime::watch_loop::WatchedApis;
use anyhow::{Context as _, Result};
use kube::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything the watch loop needs
pub struct InitializationResult {
    /// Shared sync context (caches, daemons, API seams)
    pub context: Context,
    /// Custom resource APIs to watch
    pub apis: WatchedApis,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before any TLS connection is made
    let crypto_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    let config = ControllerConfig::from_env();
    observability::logging::init(&config);
    if !crypto_installed {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting Bitwarden Secrets Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        operator.domain = config.operator_domain.as_str(),
        operator.namespace = config.operator_namespace.as_str(),
        bws = config.bws_cmd.as_str(),
        "Controller configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let server_state = ServerState::new();
    let server_state_clone = server_state.clone();
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let apis = WatchedApis {
        configs: KubeResourceApi::new(
            client.clone(),
            api_resource(
                &config.operator_domain,
                &config.operator_version,
                "BitwardenSyncConfig",
                "bitwardensyncconfigs",
            ),
        ),
        sync_secrets: KubeResourceApi::new(
            client.clone(),
            api_resource(
                &config.operator_domain,
                &config.operator_version,
                "BitwardenSyncSecret",
                "bitwardensyncsecrets",
            ),
        ),
    };

    let context = Context::new(
        config.clone(),
        Arc::new(KubeSecretApi::new(client)),
        Arc::new(BwsCli::new(&config.bws_cmd)),
        Arc::new(apis.configs.clone()),
        Arc::new(apis.sync_secrets.clone()),
    );

    info!("Controller initialized, starting watch loop...");
    Ok(InitializationResult {
        context,
        apis,
        server_state,
    })
}

/// Wait for the HTTP server to bind its listener
async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state
            .is_listening
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Resolve once SIGINT or SIGTERM is received
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Flip readiness and cancel `shutdown` on the first shutdown signal
pub fn spawn_shutdown_handler(server_state: Arc<ServerState>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        server_state.set_ready(false);
        shutdown.cancel();
    });
}
