//! HTTP server command implementation.

use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use intake::config::StoreBackend;
use intake::flow::FlowEngine;
use intake::middleware::SessionMiddleware;
use intake::reaper;
use intake::server::{self, AppState};
use intake::store;

pub async fn run(
    config_path: &str,
    host_override: Option<IpAddr>,
    port_override: Option<u16>,
    backend_override: Option<StoreBackend>,
) -> Result<()> {
    let mut config = super::load_config(config_path, backend_override).await?;

    // CLI overrides config
    if let Some(host) = host_override {
        config.server.host = host.to_string();
    }
    if let Some(port) = port_override {
        config.server.port = port;
    }

    let stores = store::connect(&config.store)
        .await
        .context("Failed to open session store")?;

    if let Some(interval) = config.store.sweep_interval() {
        reaper::spawn_reaper(stores.sessions.clone(), interval);
        info!(
            interval_seconds = interval.as_secs(),
            ttl_seconds = config.store.ttl_seconds,
            "Background expiry sweep enabled"
        );
    }

    let sessions = SessionMiddleware::for_engine(stores, FlowEngine::default())
        .strict_load(config.store.strict_load);
    let app = server::build_app(AppState::new(sessions), config.server.request_timeout_seconds);

    let ip: IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid server.host '{}'", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(addr = %addr, version = %intake::build_info::version_string(), "Starting server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
