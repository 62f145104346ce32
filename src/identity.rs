use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::SharedState;

/// Billing plan, forwarded per request by the gateway. Unknown values fall
/// back to the free tier rather than rejecting the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Free,
    Plus,
    Pro,
}

impl Plan {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "plus" => Plan::Plus,
            "pro" => Plan::Pro,
            _ => Plan::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Plus => "plus",
            Plan::Pro => "pro",
        }
    }
}

/// Caller identity established by the upstream gateway. This service trusts
/// the headers; authentication itself happens before requests reach it.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_id: Uuid,
    pub plan: Plan,
}

impl FromRequestParts<SharedState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing x-user-id header".to_string()))?;

        let user_id = Uuid::parse_str(raw)
            .map_err(|_| AppError::Unauthorized("Invalid x-user-id header".to_string()))?;

        let plan = parts
            .headers
            .get("x-user-plan")
            .and_then(|v| v.to_str().ok())
            .map(Plan::parse)
            .unwrap_or(Plan::Free);

        Ok(Identity { user_id, plan })
    }
}
