//! Govpulse API Server: serves delegation state from the indexed data.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use eyre::Result;
use govpulse_core::{Settings, normalize_address, telemetry};
use govpulse_storage::{
    self as storage, PgStore, Store,
    models::{Delegate, Delegation},
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

/// Shared application state.
struct AppState<S> {
    store: S,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let settings = Settings::from_env()?;

    tracing::info!("Starting Govpulse API Server");

    let pool = storage::connect(&settings.database_url).await?;
    storage::MIGRATOR.run(&pool).await?;

    tracing::info!("Database ready");

    let app = router(PgStore::new(pool));

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.api_port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router<S: Store + 'static>(store: S) -> Router {
    let state = Arc::new(AppState { store });

    Router::new()
        .route("/api/v1/delegates", get(list_delegates::<S>))
        .route("/api/v1/delegates/:address", get(get_delegate::<S>))
        .route("/api/v1/delegations/:delegator", get(get_delegation::<S>))
        .route("/api/v1/status", get(get_status::<S>))
        .route("/health", get(health))
        .with_state(state)
}

// ─── Query Params ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PaginationParams {
    limit: Option<i64>,
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    data: T,
}

#[derive(Serialize)]
struct StatusResponse {
    last_indexed_block: Option<i64>,
}

type ApiError = (StatusCode, Json<ApiResponse<String>>);

fn json_ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

fn json_err(status: StatusCode, msg: &str) -> ApiError {
    (
        status,
        Json(ApiResponse {
            success: false,
            data: msg.to_string(),
        }),
    )
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %e, "Store read failed");
    json_err(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
}

fn parse_address(raw: &str) -> Result<String, ApiError> {
    normalize_address(raw).map_err(|e| json_err(StatusCode::BAD_REQUEST, &e.to_string()))
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

/// GET /api/v1/delegates — delegates ranked by voting power.
async fn list_delegates<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let delegates = state.store.top_delegates(limit).await.map_err(internal)?;
    Ok(json_ok(delegates))
}

/// GET /api/v1/delegates/:address — one delegate's aggregate.
async fn get_delegate<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let address = parse_address(&address)?;
    match state.store.get::<Delegate>(&address).await.map_err(internal)? {
        Some(d) => Ok(json_ok(d)),
        None => Err(json_err(StatusCode::NOT_FOUND, "Delegate not found")),
    }
}

/// GET /api/v1/delegations/:delegator — who a delegator currently delegates to.
async fn get_delegation<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(delegator): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let delegator = parse_address(&delegator)?;
    match state
        .store
        .get::<Delegation>(&delegator)
        .await
        .map_err(internal)?
    {
        Some(d) => Ok(json_ok(d)),
        None => Err(json_err(StatusCode::NOT_FOUND, "Delegation not found")),
    }
}

async fn get_status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<impl IntoResponse, ApiError> {
    let last_indexed_block = state.store.checkpoint().await.map_err(internal)?;
    Ok(json_ok(StatusResponse { last_indexed_block }))
}
