//! Pointcast API Server — exposes the points ledger to the site's frontend.
//!
//! The authenticated user id arrives as an opaque string from the upstream
//! identity layer; this server trusts it and applies ledger semantics only.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::NaiveDate;
use pointcast_core::{LedgerError, Settings, telemetry};
use pointcast_ledger as ledger;
use pointcast_storage::{self as storage, models::PointKind, repos::HistoryFilter};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};

/// Shared application state.
struct AppState {
    pool: sqlx::PgPool,
    settings: Settings,
}

#[tokio::main]
async fn main() {
    telemetry::init();
    let settings = Settings::from_env().expect("Failed to load settings");

    tracing::info!("Starting Pointcast API Server");

    // Connect to database
    let pool = storage::connect(&settings.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Database ready");

    let port = settings.api_port;
    let state = Arc::new(AppState { pool, settings });

    let app = Router::new()
        .route("/api/v1/points/credit", post(credit_points))
        .route("/api/v1/rewards/daily", post(claim_daily_reward))
        .route("/api/v1/gifts", post(gift_points))
        .route("/api/v1/users/:user_id/balance", get(get_balance))
        .route("/api/v1/users/:user_id/history", get(get_history))
        .route("/api/v1/streamers/:streamer_id/total", get(get_streamer_total))
        .route("/internal/streamers", post(register_streamer))
        .route("/health", get(health))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

// ─── Request Types ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreditRequest {
    user_id: String,
    amount: i64,
    kind: PointKind,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ClaimRequest {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct GiftRequest {
    from_user_id: String,
    to_streamer_id: String,
    amount: i64,
    #[serde(default)]
    note: String,
}

#[derive(Debug, Deserialize)]
struct RegisterStreamerRequest {
    streamer_id: String,
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<i64>,
    kind: Option<PointKind>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    data: T,
}

#[derive(Serialize)]
struct BalanceResponse {
    user_id: String,
    point: i64,
}

#[derive(Serialize)]
struct StreamerTotalResponse {
    streamer_id: String,
    total: i64,
}

fn json_ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

fn json_err(status: StatusCode, msg: &str) -> (StatusCode, Json<ApiResponse<String>>) {
    (
        status,
        Json(ApiResponse {
            success: false,
            data: msg.to_string(),
        }),
    )
}

/// Map a ledger error onto a status and a user-safe message. Internal detail
/// stays in the logs.
fn err_response(e: LedgerError) -> (StatusCode, Json<ApiResponse<String>>) {
    match &e {
        LedgerError::InvalidInput(_) => json_err(StatusCode::BAD_REQUEST, &e.to_string()),
        LedgerError::InsufficientFunds(_) => json_err(StatusCode::CONFLICT, &e.to_string()),
        LedgerError::StorageUnavailable(detail) => {
            tracing::warn!(error = %detail, "Storage unavailable");
            json_err(
                StatusCode::SERVICE_UNAVAILABLE,
                "temporarily unavailable, please retry",
            )
        }
        LedgerError::ConsistencyRisk(detail) => {
            // Already logged at error where it was raised; keep users generic.
            tracing::warn!(error = %detail, "Consistency risk surfaced to API");
            json_err(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn storage_err(e: sqlx::Error) -> (StatusCode, Json<ApiResponse<String>>) {
    err_response(LedgerError::StorageUnavailable(e.to_string()))
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

/// POST /api/v1/points/credit — credit (or debit) a user's balance.
async fn credit_points(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreditRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiResponse<String>>)> {
    let outcome = ledger::credit_points(
        &state.pool,
        &req.user_id,
        req.amount,
        req.kind,
        &req.description,
    )
    .await
    .map_err(err_response)?;
    Ok(json_ok(outcome))
}

/// POST /api/v1/rewards/daily — claim today's reward, idempotently.
async fn claim_daily_reward(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClaimRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiResponse<String>>)> {
    let outcome = ledger::claim_daily_reward(&state.pool, &state.settings, &req.user_id)
        .await
        .map_err(err_response)?;
    Ok(json_ok(outcome))
}

/// POST /api/v1/gifts — transfer points from a user to a streamer.
async fn gift_points(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GiftRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiResponse<String>>)> {
    let outcome = ledger::gift_points(
        &state.pool,
        &req.from_user_id,
        &req.to_streamer_id,
        req.amount,
        &req.note,
    )
    .await
    .map_err(err_response)?;
    Ok(json_ok(outcome))
}

/// GET /api/v1/users/:user_id/balance — current balance (0 if never credited).
async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiResponse<String>>)> {
    let balance = storage::repos::get_balance(&state.pool, &user_id)
        .await
        .map_err(storage_err)?;
    Ok(json_ok(BalanceResponse {
        point: balance.map(|b| b.point).unwrap_or(0),
        user_id,
    }))
}

/// GET /api/v1/users/:user_id/history — ledger entries, newest first.
async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiResponse<String>>)> {
    let filter = HistoryFilter {
        limit: params.limit,
        kind: params.kind,
        from: params.from,
        to: params.to,
    };
    let entries = storage::repos::get_history(&state.pool, &user_id, &filter)
        .await
        .map_err(storage_err)?;
    Ok(json_ok(entries))
}

/// GET /api/v1/streamers/:streamer_id/total — gifted points accumulator.
async fn get_streamer_total(
    State(state): State<Arc<AppState>>,
    Path(streamer_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiResponse<String>>)> {
    let total = storage::repos::get_streamer_total(&state.pool, &streamer_id)
        .await
        .map_err(storage_err)?;
    match total {
        Some(t) => Ok(json_ok(StreamerTotalResponse {
            streamer_id,
            total: t.total,
        })),
        None => Err(json_err(StatusCode::NOT_FOUND, "Streamer not found")),
    }
}

/// POST /internal/streamers — registration hook called by the directory when
/// a streamer account is created. Idempotent.
async fn register_streamer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterStreamerRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiResponse<String>>)> {
    if req.streamer_id.trim().is_empty() {
        return Err(json_err(
            StatusCode::BAD_REQUEST,
            "streamer id must not be empty",
        ));
    }
    storage::repos::register_streamer(&state.pool, &req.streamer_id)
        .await
        .map_err(storage_err)?;
    Ok(json_ok(req.streamer_id))
}
