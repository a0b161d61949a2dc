//! Process entry point: loads configuration, initializes structured
//! logging, wires the ten components (C1-C10) into a running [`app::App`],
//! and waits for SIGINT/SIGTERM to shut down gracefully.

mod app;
mod config;
mod stores;
mod worker;

use app::{App, Collaborators};
use config::PublisherConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = PublisherConfig::from_env_or_exit();

    let filter = EnvFilter::try_new(config.log_level.to_string())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        concurrency = config.publisher_concurrency,
        circuit_breaker_enabled = config.circuit_breaker_enabled,
        rate_limiter_enabled = config.rate_limiter_enabled,
        "starting publisher core"
    );

    // Persistence, blob storage, and alerting are external collaborators
    // (spec.md §1 Non-goals): the binary wires the in-memory reference
    // implementations by default; an embedding deployment supplies its own
    // `Persistence`/`BlobStore`/`AlertSink` over the same trait seams
    // (`publisher_contracts::ports`) and calls `App::build` directly.
    let collaborators = Collaborators::in_memory();
    let app = App::build(&config, collaborators);

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(error = %err, "failed to listen for shutdown signal"),
    }

    app.shutdown().await;
    tracing::info!("publisher core stopped");
}
