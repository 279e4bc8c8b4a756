//! Main Entrypoint for the Voice Relay Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the relay settings and the realtime backend connector.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use voice_relay::{
    config::Config, router::create_router, state::AppState,
    ws::provider::openai::OpenAiConnector,
};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        info!("A TLS crypto provider was already installed");
    }

    // --- 3. Initialize Shared Services ---
    let settings = config
        .relay_settings()
        .context("Failed to build relay settings")?;
    let connector = Arc::new(OpenAiConnector::new(
        config.realtime_url.clone(),
        config.openai_api_key,
    ));
    let app_state = Arc::new(AppState::new(settings, connector));

    // --- 4. Create Router and Apply Middleware ---
    let app = create_router(app_state).layer(TraceLayer::new_for_http());

    // --- 5. Start Server ---
    info!(
        realtime_url = %config.realtime_url,
        voice = %config.voice,
        turn_detection = ?config.turn_detection,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
