// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ride-Tracker API Server
//!
//! Serves the live workout session and sensor controls to a local UI. No
//! radio stack is linked in, so sensors come from the simulated transport.

use ride_tracker::{config::Config, transport::SimulatedTransport, AppState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        activity = %config.default_activity,
        "Starting Ride-Tracker API"
    );

    // Simulated sensors with a synthetic measurement feed
    let transport = Arc::new(SimulatedTransport::with_demo_peripherals());
    let shutdown = CancellationToken::new();
    let feed = transport.spawn_synthetic_feed(config.simulated_feed_interval, shutdown.clone());
    tracing::info!(
        interval_ms = config.simulated_feed_interval.as_millis() as u64,
        "Simulated sensor feed started"
    );

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), transport));

    // Build router
    let app = ride_tracker::routes::create_router(state.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Release sensors before exiting
    state.hub.disconnect_all().await;
    shutdown.cancel();
    feed.await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ride_tracker=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
