use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::identity::Identity;
use crate::models::GenerationKind;
use crate::quota::{self, Resource};
use crate::state::SharedState;

pub async fn current(
    identity: Identity,
    State(state): State<SharedState>,
    Path(kind): Path<GenerationKind>,
) -> Result<Json<Value>, AppError> {
    let resource = Resource::for_kind(kind);
    let decision = quota::peek(&state.pool, identity.user_id, identity.plan, resource).await?;

    Ok(Json(json!({
        "resource": resource.as_str(),
        "period": resource.period().as_str(),
        "plan": identity.plan.as_str(),
        "used": decision.used,
        "limit": decision.limit,
        "permitted": decision.permitted,
    })))
}
