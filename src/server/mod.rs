// src/server/mod.rs

//! The main server startup function, orchestrating all setup phases.

use crate::config::Config;
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

pub mod listener;
pub mod invalidate;
pub mod middleware;
pub mod proxy;
pub mod router;
pub mod state;

/// Brings up the shared state, spawns the store sweepers, and runs the
/// listener until shutdown. Bind failures propagate to a non-zero exit.
pub async fn run(config: Config) -> Result<()> {
    let (shutdown_tx, _) = broadcast::channel(1);

    let state = state::build(config, &shutdown_tx).await?;
    info!("Server state initialized.");

    let app = router::build(state.clone())
        .into_make_service_with_connect_info::<listener::ClientAddr>();

    let bind_addr = state.config.listen_addr();
    let tcp_listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {bind_addr}"))?;
    info!(
        "Rampart listening on {}, forwarding to {}.",
        bind_addr, state.config.host_destination
    );

    if state.config.use_ssl {
        let acceptor = listener::build_acceptor(&state.config)?;
        let tls_listener = listener::TlsListener::new(tcp_listener, acceptor);
        axum::serve(tls_listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .await
            .context("server error")?;
    } else {
        axum::serve(tcp_listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .await
            .context("server error")?;
    }

    info!("Server stopped.");
    Ok(())
}

/// Resolves on ctrl-c and fans the shutdown out to the background tasks.
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received.");
    let _ = shutdown_tx.send(());
}
