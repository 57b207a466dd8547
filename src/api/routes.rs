//! API route definitions.

use super::state::AppState;
use crate::insight;
use crate::storage::StoreError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/dashboard", get(dashboard))
        .route("/entities", get(list_entities))
        .route("/series/{entity}", get(series))
        .route("/active", get(active).put(select_active))
}

/// Error response in the same envelope as successful ones.
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
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        tracing::error!("Store query failed: {}", e);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        tracing::error!("Store task failed: {}", e);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "data": null, "meta": { "error": self.message } }));
        (self.status, body).into_response()
    }
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta()
    }))
}

async fn dashboard(State(state): State<AppState>) -> Json<Value> {
    match state.view.latest() {
        Some(dashboard) => Json(json!({ "data": dashboard, "meta": meta() })),
        None => {
            let mut meta = meta();
            meta["message"] = json!("no cycle has completed yet");
            Json(json!({ "data": null, "meta": meta }))
        }
    }
}

async fn list_entities(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let store = state.store.clone();
    // SQLite reads block; keep them off the async workers
    let recorded = tokio::task::spawn_blocking(move || store.entities()).await??;

    Ok(Json(json!({
        "data": {
            "selectable": state.entities.as_slice(),
            "recorded": recorded,
        },
        "meta": { "total": recorded.len() }
    })))
}

async fn series(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let store = state.store.clone();
    let key = entity.clone();
    let series = tokio::task::spawn_blocking(move || store.read_all(&key)).await??;
    let insight = insight::compute(&series);

    Ok(Json(json!({
        "data": {
            "entity_key": entity,
            "series": series,
            "insight": insight,
        },
        "meta": { "total": series.len() }
    })))
}

async fn active(State(state): State<AppState>) -> Json<Value> {
    let current = state.selection.borrow().clone();
    Json(json!({ "data": { "entity_key": current }, "meta": meta() }))
}

#[derive(Deserialize)]
struct SelectRequest {
    entity_key: String,
}

async fn select_active(
    State(state): State<AppState>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<Value>, ApiError> {
    if !state.entities.iter().any(|e| e == &req.entity_key) {
        return Err(ApiError::bad_request(format!(
            "unknown entity '{}'",
            req.entity_key
        )));
    }

    tracing::info!(entity = %req.entity_key, "Active entity selected via API");
    state.selection.send_replace(req.entity_key.clone());
    Ok(Json(json!({ "data": { "entity_key": req.entity_key }, "meta": meta() })))
}
