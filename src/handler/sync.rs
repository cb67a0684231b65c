use crate::app::AppState;
use crate::sync::SyncOptions;
use crate::{Error, Result};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sync", post(start).get(list))
        .route("/sync/stats", get(stats))
        .route("/sync/{id}", get(show))
        .route("/sync/{id}/cancel", post(cancel))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    owner_id: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

async fn start(
    State(state): State<AppState>,
    Json(options): Json<SyncOptions>,
) -> Result<impl IntoResponse> {
    let job_id = state.sync.start(options).await?;
    Ok(Json(json!({ "job_id": job_id })))
}

async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let jobs = state
        .sync
        .list(query.owner_id.as_deref(), query.limit)
        .await?;
    Ok(Json(jobs))
}

async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let stats = state.sync.stats().await?;
    Ok(Json(stats))
}

async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let job = state
        .sync
        .status(&id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("sync job {}", id)))?;
    Ok(Json(job))
}

async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let cancelled = state.sync.cancel(&id).await;
    Ok(Json(json!({ "cancelled": cancelled })))
}
