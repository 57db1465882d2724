//! HTTP handlers for the dashboard JSON API

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};

use crate::config::Config;
use crate::error::AppError;
use crate::models::*;
use crate::views;
use crate::workflow::{Dashboard, DashboardState, InvocationOutcome};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub dashboard: Arc<Dashboard>,
}

impl AppState {
    pub fn new(config: Config, dashboard: Arc<Dashboard>) -> Self {
        Self { config, dashboard }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))

        // Catalog
        .route("/api/v1/applets", get(list_applets))
        .route("/api/v1/applets/:id", get(get_applet))
        .route("/api/v1/applets/:id/invoke", post(invoke_applet))

        // Wallet
        .route("/api/v1/wallet", get(wallet_status))
        .route("/api/v1/wallet/connect", post(connect_wallet))
        .route("/api/v1/wallet/refresh", post(refresh_wallet))
        .route("/api/v1/network/switch", post(switch_network))

        // Proof history
        .route("/api/v1/proofs", get(list_proofs))
        .route("/api/v1/proofs/:id", get(get_proof))
        .route("/api/v1/audit", post(compose_audit))

        // Application state
        .route("/api/v1/state", get(get_state))
        .route("/api/v1/events", get(events))

        // Server-rendered views
        .merge(views::routes())

        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub category: Option<String>,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.dashboard.snapshot().await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        expected_chain_id: state.config.chain.chain_id.clone(),
        chain_name: state.config.chain.chain_name.clone(),
        provider_present: state.dashboard.provider_present(),
        applets: state.dashboard.catalog().len(),
        proofs: snapshot.history.len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Search the catalog by name/description and category
pub async fn list_applets(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Applet>>, AppError> {
    let category = Category::parse_filter(query.category.as_deref().unwrap_or_default())
        .map_err(AppError::BadRequest)?;
    let applets = state
        .dashboard
        .catalog()
        .search(query.q.as_deref().unwrap_or_default(), category)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(applets))
}

pub async fn get_applet(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Applet>, AppError> {
    let applet = state
        .dashboard
        .catalog()
        .get(&id)
        .cloned()
        .ok_or(AppError::AppletNotFound(id))?;
    Ok(Json(applet))
}

/// Select an applet, fill the form and run the invocation workflow
pub async fn invoke_applet(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, AppError> {
    let dashboard = &state.dashboard;
    dashboard
        .stage_invocation(&id, &request.input, &request.metadata)
        .await?;

    let outcome = dashboard.invoke().await?;
    let label = outcome.label();

    let response = match outcome {
        InvocationOutcome::Recorded(proof) => InvokeResponse {
            outcome: label,
            explorer_url: Some(dashboard.explorer_link(&proof.tx_hash)),
            proof: Some(proof),
        },
        _ => InvokeResponse {
            outcome: label,
            proof: None,
            explorer_url: None,
        },
    };

    Ok(Json(response))
}

async fn wallet_snapshot(state: &AppState) -> WalletStatus {
    let snapshot = state.dashboard.snapshot().await;
    WalletStatus {
        wallet: snapshot.wallet,
        provider_present: state.dashboard.provider_present(),
        expected_chain_id: state.config.chain.chain_id.clone(),
        network_warning: snapshot.network_warning,
    }
}

pub async fn wallet_status(State(state): State<AppState>) -> Json<WalletStatus> {
    Json(wallet_snapshot(&state).await)
}

pub async fn connect_wallet(State(state): State<AppState>) -> Result<Json<WalletStatus>, AppError> {
    state.dashboard.connect().await?;
    Ok(Json(wallet_snapshot(&state).await))
}

pub async fn refresh_wallet(State(state): State<AppState>) -> Result<Json<WalletStatus>, AppError> {
    state.dashboard.refresh_balance().await?;
    Ok(Json(wallet_snapshot(&state).await))
}

/// Ask the wallet to move to the expected chain. The outcome arrives later as
/// a chain change notification.
pub async fn switch_network(State(state): State<AppState>) -> impl IntoResponse {
    state.dashboard.switch_network().await;
    (StatusCode::ACCEPTED, Json(wallet_snapshot(&state).await))
}

pub async fn list_proofs(State(state): State<AppState>) -> Json<Vec<VerificationProof>> {
    Json(state.dashboard.snapshot().await.history)
}

pub async fn get_proof(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VerificationProof>, AppError> {
    let proof = state
        .dashboard
        .snapshot()
        .await
        .history
        .into_iter()
        .find(|p| p.id == id)
        .ok_or(AppError::ProofNotFound(id))?;
    Ok(Json(proof))
}

/// Consolidated compliance audit record over the proof history
pub async fn compose_audit(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let record = state.dashboard.compose_audit().await?;
    Ok(Json(record))
}

pub async fn get_state(State(state): State<AppState>) -> Json<DashboardState> {
    Json(state.dashboard.snapshot().await)
}

/// Server-sent stream of state change revisions
pub async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(state.dashboard.subscribe()).map(|change| {
        match Event::default().event("state").json_data(change) {
            Ok(event) => Ok(event),
            Err(_) => Ok(Event::default().event("state")),
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("hb"),
    )
}
