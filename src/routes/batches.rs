use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db;
use crate::error::AppError;
use crate::identity::Identity;
use crate::models::{BatchParameters, BatchStatus, GenerationKind, QueueRecord};
use crate::state::SharedState;
use crate::worker;

#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    pub parameters: BatchParameters,
    pub target_count: i64,
}

pub async fn create(
    identity: Identity,
    State(state): State<SharedState>,
    Path(kind): Path<GenerationKind>,
    Json(req): Json<CreateBatchRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if req.target_count < 1 {
        return Err(AppError::BadRequest(
            "target_count must be at least 1".to_string(),
        ));
    }
    if req.target_count > state.config.max_batch_size {
        return Err(AppError::BadRequest(format!(
            "target_count must be at most {}",
            state.config.max_batch_size
        )));
    }
    if req.parameters.subject.trim().is_empty() {
        return Err(AppError::BadRequest("subject must not be empty".to_string()));
    }
    if req.parameters.topics.is_empty() {
        return Err(AppError::BadRequest(
            "at least one topic is required".to_string(),
        ));
    }
    if req.parameters.topics.iter().any(|t| t.trim().is_empty()) {
        return Err(AppError::BadRequest("topics must not be empty".to_string()));
    }

    let record = db::queue_records::create(
        &state.pool,
        identity.user_id,
        kind,
        &req.parameters,
        req.target_count,
    )
    .await
    .map_err(|e| {
        if db::is_unique_violation(&e) {
            AppError::AlreadyActive("Finish or cancel your current batch first".to_string())
        } else {
            AppError::Database(e)
        }
    })?;

    tracing::info!(
        queue_record_id = %record.id,
        kind = kind.as_str(),
        target = record.target_count,
        "Batch created"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "queue_record_id": record.id,
            "status": record.status,
        })),
    ))
}

pub async fn advance(
    identity: Identity,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let outcome = worker::advance_unit(&state, identity, id).await?;

    Ok(Json(json!({
        "status": outcome.record.status,
        "produced_count": outcome.record.produced_count,
        "target_count": outcome.record.target_count,
        "error_count": outcome.record.error_count,
        "item_failed": outcome.item_failed,
    })))
}

pub async fn cancel(
    identity: Identity,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueRecord>, AppError> {
    if let Some(record) =
        db::queue_records::cancel(&state.pool, id, identity.user_id, Utc::now()).await?
    {
        tracing::info!(
            queue_record_id = %record.id,
            produced = record.produced_count,
            "Batch cancelled"
        );
        return Ok(Json(record));
    }

    // Nothing matched: the record is terminal or missing.
    let record = db::queue_records::find_by_id_scoped(&state.pool, id, identity.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch not found".to_string()))?;

    match record.status {
        BatchStatus::Cancelled => Ok(Json(record)),
        BatchStatus::Completed => Err(AppError::Conflict(
            "Batch already completed".to_string(),
        )),
        _ => Err(AppError::Internal(
            "Cancel raced with a concurrent update".to_string(),
        )),
    }
}

pub async fn get_one(
    identity: Identity,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueRecord>, AppError> {
    let record = db::queue_records::find_by_id_scoped(&state.pool, id, identity.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch not found".to_string()))?;

    Ok(Json(record))
}

pub async fn active(
    identity: Identity,
    State(state): State<SharedState>,
    Path(kind): Path<GenerationKind>,
) -> Result<Json<QueueRecord>, AppError> {
    let record = db::queue_records::find_active(&state.pool, identity.user_id, kind)
        .await?
        .ok_or_else(|| AppError::NotFound("No active batch".to_string()))?;

    Ok(Json(record))
}
