use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AdminAuth;
use crate::error::AppError;
use crate::models::OutboxEntry;
use crate::state::SharedState;

const MAX_LIST_LIMIT: i64 = 500;

#[derive(Deserialize)]
pub struct EnqueueEntry {
    pub action_type: String,
    pub payload: serde_json::Value,
    pub max_attempts: Option<i32>,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

pub async fn enqueue(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Json(req): Json<EnqueueEntry>,
) -> Result<Json<OutboxEntry>, AppError> {
    let entry = state
        .processor
        .enqueue(&req.action_type, req.payload, req.max_attempts)
        .await?;
    Ok(Json(entry))
}

pub async fn list_pending(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<OutboxEntry>>, AppError> {
    let limit = params
        .limit
        .unwrap_or(state.processor.config().batch_size)
        .clamp(1, MAX_LIST_LIMIT);
    let entries = state.processor.list_pending(limit).await?;
    Ok(Json(entries))
}

pub async fn stats(
    _auth: AdminAuth,
    State(state): State<SharedState>,
) -> Result<Json<BTreeMap<&'static str, i64>>, AppError> {
    let counts = state
        .processor
        .stats()
        .await?
        .into_iter()
        .map(|(status, count)| (status.as_str(), count))
        .collect();
    Ok(Json(counts))
}

pub async fn get(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OutboxEntry>, AppError> {
    let entry = state.processor.get(id).await?;
    Ok(Json(entry))
}

pub async fn retry(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OutboxEntry>, AppError> {
    let entry = state.processor.process_single(id).await?;
    Ok(Json(entry))
}

pub async fn abandon(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OutboxEntry>, AppError> {
    let entry = state.processor.abandon_entry(id).await?;
    Ok(Json(entry))
}
