//! Task collection routes.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use ferry_engine::http::IDEMPOTENCY_HEADER;
use serde_json::Value;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{handle_create, handle_delete, handle_get, handle_list, handle_update};
use crate::AppState;

/// Create task routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_handler).post(create_handler))
        .route(
            "/tasks/{id}",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
}

/// POST /tasks - 201 on first create, 200 when the idempotency key replays.
async fn create_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Value>)> {
    let key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty());

    tracing::debug!(anonymous = auth.is_anonymous(), key = ?key, "create request");

    let created = handle_create(&state.pool, &body, key).await?;
    let status = if created.inserted {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(created.task)))
}

/// GET /tasks - every task.
async fn list_handler(State(state): State<AppState>, _auth: AuthUser) -> Result<Json<Vec<Value>>> {
    Ok(Json(handle_list(&state.pool).await?))
}

/// GET /tasks/{id}
async fn get_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    Ok(Json(handle_get(&state.pool, &id).await?))
}

/// PUT /tasks/{id} - 404 when the task does not exist.
async fn update_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    Ok(Json(handle_update(&state.pool, &id, &body).await?))
}

/// DELETE /tasks/{id} - 204 whether or not the task existed.
async fn delete_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    handle_delete(&state.pool, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
