use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::db;
use crate::error::AppError;
use crate::identity::Identity;
use crate::models::{GeneratedItem, GenerationKind};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub kind: Option<GenerationKind>,
    pub limit: Option<i64>,
}

pub async fn list(
    identity: Identity,
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<GeneratedItem>>, AppError> {
    let limit = params.limit.unwrap_or(50).min(200).max(1);
    let items = db::items::list(&state.pool, identity.user_id, params.kind, limit).await?;

    Ok(Json(items))
}
