//! The HTTP transport: one route per command in `commands.rs`, plus the
//! status stream. Every handler is a thin wrapper — the command functions
//! are the only place business logic lives, matching the one-implementation-
//! two-transports split noted in `state.rs`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use serde::Serialize;
use serde_json::json;

use usc_bus::StatusBus;
use usc_types::CoreError;

use crate::commands::{self, *};
use crate::state::AppState;

/// Build the router. Nests every named command with a typed payload under
/// `/commands/*`; `/status/stream` is the always-on SSE status feed any
/// observer can attach to.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/commands/get_all_universes", get(get_all_universes))
        .route("/commands/get_active_universe", get(get_active_universe))
        .route("/commands/get_auth_status", get(get_auth_status))
        .route("/commands/switch_active", post(switch_active))
        .route("/commands/create_universe", post(create_universe))
        .route("/commands/delete_universe", post(delete_universe))
        .route("/commands/update_universe", post(update_universe))
        .route("/commands/discover_in_repo", post(discover_in_repo))
        .route("/commands/link_discovered", post(link_discovered))
        .route("/commands/resolve_sync_conflict", post(resolve_sync_conflict))
        .route("/commands/force_save", post(force_save))
        .route("/status/stream", get(status_stream))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Wraps a [`CoreError`] with the HTTP status and recovery hint the UI
/// command surface is documented to receive.
struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(value: CoreError) -> Self {
        ApiError(value)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
    recovery_hint: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::Unauthorized | CoreError::ReauthRequired => StatusCode::UNAUTHORIZED,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict => StatusCode::CONFLICT,
            CoreError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            CoreError::BadRequest(_) | CoreError::InvariantViolation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotSupported(_) => StatusCode::NOT_IMPLEMENTED,
            CoreError::Cancelled => StatusCode::BAD_REQUEST,
            CoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoreError::Network(_) | CoreError::Server(_) => StatusCode::BAD_GATEWAY,
        };
        let kind = match &self.0 {
            CoreError::Unauthorized => "unauthorized",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::NotFound(_) => "not_found",
            CoreError::Conflict => "conflict",
            CoreError::RateLimited { .. } => "rate_limited",
            CoreError::Network(_) => "network",
            CoreError::Server(_) => "server",
            CoreError::BadRequest(_) => "bad_request",
            CoreError::NotSupported(_) => "not_supported",
            CoreError::InvariantViolation(_) => "invariant_violation",
            CoreError::Cancelled => "cancelled",
            CoreError::Timeout(_) => "timeout",
            CoreError::ReauthRequired => "reauth_required",
        };
        let body = ErrorBody {
            kind,
            message: self.0.to_string(),
            recovery_hint: self.0.recovery_hint(),
        };
        (status, Json(body)).into_response()
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_all_universes(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(commands::get_all_universes(&state))
}

async fn get_active_universe(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(commands::get_active_universe(&state))
}

async fn get_auth_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(commands::get_auth_status(&state).await)
}

async fn switch_active(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SwitchActivePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = commands::switch_active(&state, payload).await?;
    Ok(Json(json!({ "store_state": outcome.store_state })))
}

async fn create_universe(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUniversePayload>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(commands::create_universe(&state, payload).await?))
}

async fn delete_universe(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DeleteUniversePayload>,
) -> Result<impl IntoResponse, ApiError> {
    commands::delete_universe(&state, payload).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn update_universe(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateUniversePayload>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(commands::update_universe(&state, payload).await?))
}

async fn discover_in_repo(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DiscoverInRepoPayload>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(commands::discover_in_repo(&state, payload).await?))
}

async fn link_discovered(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LinkDiscoveredPayload>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(commands::link_discovered(&state, payload).await?))
}

async fn resolve_sync_conflict(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResolveSyncConflictPayload>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(commands::resolve_sync_conflict(&state, payload).await?))
}

async fn force_save(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForceSavePayload>,
) -> Result<impl IntoResponse, ApiError> {
    commands::force_save(&state, payload).await?;
    Ok(Json(json!({ "ok": true })))
}

/// `GET /status/stream` — the ordered status feed, as server-sent events. A
/// subscriber that falls behind the bus's ring buffer sees a `lagged`
/// comment event rather than a silent gap.
async fn status_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.bus.subscribe();
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse_event = Event::default().json_data(&event).unwrap_or_else(|_| {
                        Event::default().data("could not serialize status event")
                    });
                    return Some((Ok(sse_event), rx));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "status stream subscriber lagged behind the bus");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
