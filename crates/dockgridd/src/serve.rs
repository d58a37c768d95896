//! `dockgridd serve`: assemble subsystems and run until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};

use dockgrid_controller::Reconciler;
use dockgrid_runtime::{DockerRuntime, RuntimeClient};
use dockgrid_state::StateStore;

use crate::settings::Settings;

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    info!(
        port = settings.port,
        data_dir = %settings.data_dir.display(),
        interval = %settings.interval,
        "DockGrid daemon starting"
    );

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(&settings.data_dir)
        .with_context(|| format!("creating data directory {}", settings.data_dir.display()))?;
    let db_path = settings.data_dir.join("dockgrid.redb");
    let store = StateStore::open(&db_path)
        .with_context(|| format!("opening state store at {}", db_path.display()))?;
    info!(path = ?db_path, "state store opened");

    let runtime: Arc<dyn RuntimeClient> = Arc::new(
        DockerRuntime::connect()
            .await
            .context("connecting to container engine")?,
    );

    let mut reconciler = Reconciler::new(store.clone(), runtime.clone(), settings.controller);

    // ── Start background tasks ─────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let controller_handle = tokio::spawn(async move {
        reconciler.run(shutdown_rx).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = dockgrid_api::build_router(store, runtime);
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "API server listening");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(ctrl_c())
        .await;

    // Stop the controller whether the server drained or failed.
    let _ = shutdown_tx.send(true);
    if let Err(e) = controller_handle.await {
        error!(error = %e, "controller task failed");
    }

    served.context("API server failed")?;
    info!("DockGrid daemon stopped");
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed the daemon keeps
/// running until killed.
async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    }
}
