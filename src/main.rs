use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{fmt, EnvFilter};

use prompt_gallery::{
    config::Config,
    history::HistoryClient,
    orchestrator::Orchestrator,
    replicate::ReplicateClient,
    routes::{router, AppState},
};

// One thread of control; every network call is a suspension point.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    if let Some(token) = &config.replicate.api_token {
        tracing::info!("Using Replicate token: {}...", token.chars().take(6).collect::<String>());
    }
    tracing::info!(model = ?config.replicate.model, history = %config.history.api_base, policy = ?config.overlap_policy, "Loaded configuration");

    let generator = Arc::new(ReplicateClient::new(&config.replicate));
    let history = Arc::new(HistoryClient::new(&config.history));
    let session = Arc::new(Orchestrator::new(generator.clone(), history, config.overlap_policy, config.history.page_size));

    session.load_initial_history().await;

    let app = router(AppState { generator, session });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
