//! HTTP surface of the Chiron tutorial player.
//!
//! The server owns a single [`chiron_engine::ContentEngine`] behind a mutex and exposes it
//! to the browser client: loading a document, reading the current step, running operator
//! commands, reading the history and restarting the environment.

pub mod loader;
pub mod routes;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use loader::{DocumentLoader, HttpDocumentLoader, LoaderError, resolve_content_url};
pub use routes::{AppState, router};

/// Serves `router` on `bind_address` until `shutdown` is cancelled.
pub async fn serve(bind_address: SocketAddr, router: Router, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("bind {bind_address}"))?;
    let bound_address = listener.local_addr().context("read bound address")?;
    info!(address = %bound_address, "server established");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("http server failed")?;
    info!("server stopped");
    Ok(())
}
