//! `chiron` binary: parses configuration, connects to the cluster and serves the tutorial
//! player until ctrl-c or a hard restart.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use chiron_cluster::KubeClusterApi;
use chiron_engine::{ContentEngine, EngineConfig, FsSink, SystemShell};
use chiron_server::{AppState, HttpDocumentLoader, router, serve};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Serves interactive tutorials that drive a Kubernetes cluster.
#[derive(Debug, Parser)]
#[command(name = "chiron", version, about)]
struct Config {
    /// HTTP listen port.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Listen address.
    #[arg(long, env = "CHIRON_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Root for written manifests and the working directory for commands.
    #[arg(long, env = "CHIRON_WORKSPACE_DIR", default_value = ".")]
    workspace_dir: PathBuf,

    /// Directory served as static files; step assets land in its `assets/` subdirectory.
    #[arg(long, env = "CHIRON_STATIC_DIR", default_value = "./static")]
    static_dir: PathBuf,

    /// Namespace torn down on restart and assumed by conditions without one.
    #[arg(long, env = "CHIRON_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Retry interval for WAIT actions and teardown waits, in milliseconds.
    #[arg(long, env = "CHIRON_POLL_INTERVAL_MS", default_value_t = 200)]
    poll_interval_ms: u64,
}

impl Config {
    fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(&self.workspace_dir, &self.static_dir)
            .with_namespace(&self.namespace)
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Config::parse();
    info!(?config, "starting");

    let cluster = KubeClusterApi::try_default().await.context("connect to the cluster")?;
    let engine = ContentEngine::new(
        config.engine_config(),
        Arc::new(cluster),
        Arc::new(FsSink),
        Arc::new(SystemShell::default()),
    );
    let loader = HttpDocumentLoader::new().context("build http client")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_ctrl_c(shutdown.clone()));

    let state = AppState::new(engine, Arc::new(loader), shutdown.clone());
    serve(config.bind_address(), router(state, &config.static_dir), shutdown).await
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn shutdown_on_ctrl_c(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(error) = result {
                warn!(%error, "failed to listen for ctrl-c");
                return;
            }
            info!("ctrl-c received, shutting down");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}
