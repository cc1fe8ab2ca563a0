//! HTTP API for the sync server.
//!
//! Two sync endpoints behind bearer-token auth plus a public health
//! check. `POST /sync` upserts a batch of envelopes and stamps them;
//! `GET /sync?ks=task,event&ts=<rfc3339>` returns everything of the
//! requested kinds updated at or after the timestamp.

use axum::{
    extract::{Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::models::{Item, Kind};
use crate::server::storage::ItemStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: ItemStore,
    pub api_key: String,
}

/// JSON error body returned by every failing endpoint.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(e: impl std::fmt::Display) -> Self {
        tracing::error!("request failed: {}", e);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Authentication middleware: a single shared bearer key.
async fn auth_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) if h.starts_with("Bearer ") => &h[7..],
        _ => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "bearer authorization required".to_string(),
                }),
            )
                .into_response();
        }
    };

    if api_key != state.api_key {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "invalid api key".to_string(),
            }),
        )
            .into_response();
    }

    next.run(request).await
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required).
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn sync_post(
    State(state): State<AppState>,
    Json(items): Json<Vec<Item>>,
) -> Result<StatusCode, ApiError> {
    for item in &items {
        if item.id.is_empty() {
            return Err(ApiError::bad_request("item without an id"));
        }
        if item.body.is_empty() {
            return Err(ApiError::bad_request(format!(
                "item {} has an empty body",
                item.id
            )));
        }
    }

    let now = Utc::now();
    for item in &items {
        state
            .store
            .update(item, now)
            .await
            .map_err(ApiError::internal)?;
    }

    tracing::info!(count = items.len(), "stored sync batch");

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct SyncQuery {
    #[serde(default)]
    ks: String,
    #[serde(default)]
    ts: String,
}

async fn sync_get(
    State(state): State<AppState>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<Vec<Item>>, ApiError> {
    let mut kinds = Vec::new();
    for raw in query.ks.split(',').filter(|s| !s.is_empty()) {
        let kind = Kind::parse(raw)
            .ok_or_else(|| ApiError::bad_request(format!("unknown kind: {}", raw)))?;
        kinds.push(kind);
    }

    let since = if query.ts.is_empty() {
        None
    } else {
        let ts = DateTime::parse_from_rfc3339(&query.ts)
            .map_err(|e| ApiError::bad_request(format!("invalid ts: {}", e)))?;
        Some(ts.with_timezone(&Utc))
    };

    let items = state
        .store
        .updated(&kinds, since)
        .await
        .map_err(ApiError::internal)?;

    Ok(Json(items))
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/sync", get(sync_get).post(sync_post))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
