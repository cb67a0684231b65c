use crate::app::AppState;
use crate::campaign::personalize;
use crate::models::ChannelType;
use crate::{Error, Result};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/calls", post(create).get(list))
        .route("/calls/{id}", get(show))
        .route("/calls/{id}/reply", post(reply))
}

#[derive(Debug, Deserialize)]
struct CreateCallRequest {
    owner_id: String,
    phone_number: String,
    channel: Option<ChannelType>,
    #[serde(default)]
    variables: HashMap<String, String>,
    voice_id: Option<String>,
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

#[derive(Debug, Deserialize)]
struct ReplyRequest {
    message: String,
}

async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateCallRequest>,
) -> Result<impl IntoResponse> {
    let phone = personalize::normalize_phone(
        &req.phone_number,
        &state.config.campaign.country_code,
    )
    .ok_or_else(|| {
        Error::Validation(format!("invalid phone number: {}", req.phone_number))
    })?;
    let result = state
        .sessions
        .initiate_call(
            &req.owner_id,
            &phone,
            req.channel.unwrap_or(ChannelType::Live),
            req.variables,
            req.voice_id,
        )
        .await?;
    Ok(Json(result))
}

async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let sessions = state.sessions.list(&query.owner_id, query.limit).await?;
    Ok(Json(sessions))
}

async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let session = state
        .sessions
        .get(&id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("call session {}", id)))?;
    Ok(Json(session))
}

async fn reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReplyRequest>,
) -> Result<impl IntoResponse> {
    let reply = state.sessions.generate_reply(&id, &req.message).await?;
    Ok(Json(json!({ "reply": reply })))
}
