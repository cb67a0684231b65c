use crate::app::AppState;
use crate::campaign::NewCampaign;
use crate::{Error, Result};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/campaigns", post(create).get(list))
        .route("/campaigns/{id}", get(show).delete(remove))
        .route("/campaigns/{id}/stats", get(stats))
        .route("/campaigns/{id}/start", post(start))
        .route("/campaigns/{id}/pause", post(pause))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    owner_id: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

async fn create(
    State(state): State<AppState>,
    Json(req): Json<NewCampaign>,
) -> Result<impl IntoResponse> {
    let campaign = state.campaigns.create(req).await?;
    Ok(Json(campaign))
}

async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let campaigns = state.campaigns.list(&query.owner_id, query.limit).await?;
    Ok(Json(campaigns))
}

async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let campaign = state
        .campaigns
        .get(&id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("campaign {}", id)))?;
    Ok(Json(campaign))
}

async fn stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let stats = state.campaigns.stats(&id).await?;
    Ok(Json(stats))
}

async fn start(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.campaigns.start(&id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn pause(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.campaigns.pause(&id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.campaigns.delete(&id).await?;
    Ok(Json(json!({ "success": true })))
}
