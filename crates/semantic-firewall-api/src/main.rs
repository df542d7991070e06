//! Semantic Firewall server

use semantic_firewall_api::config::load_config;
use semantic_firewall_api::realtime::dispatch_events;
use semantic_firewall_api::router::create_router;
use semantic_firewall_api::state::AppState;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = load_config()?;
    let bind_address = config.server.bind_address();

    let (state, event_rx) = AppState::build(config).await;

    // Event fan-out and connection heartbeats
    tokio::spawn(dispatch_events(event_rx, Arc::clone(&state.ws)));
    tokio::spawn(Arc::clone(&state.ws).heartbeat_loop());

    // Warm up detectors off the async runtime so the first request does
    // not pay model-load latency
    let registry = Arc::clone(&state.registry);
    tokio::task::spawn_blocking(move || registry.warm_up());

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = bind_address, "Semantic Firewall listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, starting graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown..."),
    }
}
