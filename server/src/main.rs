//! VerifyChain Server
//!
//! Dashboard for paying per-call fees to AI verification applets on Celo
//! and keeping the resulting verification proofs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod catalog;
mod config;
mod error;
mod handlers;
mod models;
mod services;
mod views;
mod workflow;

use catalog::Catalog;
use config::Config;
use services::rpc::JsonRpcProvider;
use services::verifier::GeminiVerifier;
use services::wallet::{WalletConnector, WalletProvider};
use workflow::Dashboard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verifychain_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting VerifyChain Server");
    tracing::info!("Chain: {} ({})", config.chain.chain_name, config.chain.chain_id);
    tracing::info!("Fee registry: {}", config.registry_address);

    // Wallet provider, absent when no bridge is configured
    let provider: Option<Arc<dyn WalletProvider>> = match &config.wallet_rpc_url {
        Some(url) => {
            let rpc = Arc::new(JsonRpcProvider::new(url));
            if config.wallet_watch_interval_secs > 0 {
                rpc.spawn_watcher(Duration::from_secs(config.wallet_watch_interval_secs));
            }
            tracing::info!("Wallet provider: {}", url);
            Some(rpc as Arc<dyn WalletProvider>)
        }
        None => {
            tracing::warn!("No wallet provider configured");
            None
        }
    };

    if config.api_key.is_none() {
        tracing::warn!("No AI API key configured, attestations will fail");
    }

    let connector = WalletConnector::new(provider, config.chain.clone());
    let verifier = Arc::new(GeminiVerifier::new(&config));
    let dashboard = Arc::new(Dashboard::new(
        config.clone(),
        Catalog::seeded(),
        connector,
        verifier,
    ));

    dashboard.detect_and_restore().await;
    dashboard.spawn_event_loop();

    let state = handlers::AppState::new(config.clone(), dashboard);

    // Build router
    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
