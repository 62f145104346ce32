use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::identity::Plan;
use crate::models::{BatchParameters, BatchStatus, GenerationKind};

/// The slice of the queue record the client cares about. Deserialized from
/// the full record; extra fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSnapshot {
    pub id: Uuid,
    pub kind: GenerationKind,
    pub status: BatchStatus,
    pub target_count: i64,
    pub produced_count: i64,
    pub error_count: i64,
}

/// Body of a successful advance call.
#[derive(Debug, Clone, Deserialize)]
pub struct AdvanceResponse {
    pub status: BatchStatus,
    pub produced_count: i64,
    pub target_count: i64,
    pub error_count: i64,
    pub item_failed: bool,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    AlreadyActive,
    QuotaExceeded { used: i64, limit: i64 },
    Conflict(String),
    Transport(String),
    Unexpected { status: u16, message: String },
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound => write!(f, "batch not found"),
            ApiError::AlreadyActive => {
                write!(f, "an active batch of this kind already exists")
            }
            ApiError::QuotaExceeded { used, limit } => {
                write!(f, "quota exceeded: {used} of {limit} used")
            }
            ApiError::Conflict(msg) => write!(f, "conflict: {msg}"),
            ApiError::Transport(msg) => write!(f, "transport error: {msg}"),
            ApiError::Unexpected { status, message } => {
                write!(f, "unexpected response ({status}): {message}")
            }
        }
    }
}

impl std::error::Error for ApiError {}

/// The server calls a driver makes. Production uses [`HttpBatchApi`];
/// tests may implement the trait directly.
#[async_trait]
pub trait BatchApi: Send + Sync {
    async fn create_batch(
        &self,
        kind: GenerationKind,
        parameters: &BatchParameters,
        target_count: i64,
    ) -> Result<Uuid, ApiError>;

    async fn fetch_batch(&self, id: Uuid) -> Result<BatchSnapshot, ApiError>;

    async fn advance_unit(&self, id: Uuid) -> Result<AdvanceResponse, ApiError>;

    async fn cancel_batch(&self, id: Uuid) -> Result<BatchSnapshot, ApiError>;
}

/// Talks to the generation endpoints over HTTP, forwarding the caller's
/// identity headers on every request.
pub struct HttpBatchApi {
    client: reqwest::Client,
    base_url: String,
    user_id: Uuid,
    plan: Plan,
}

impl HttpBatchApi {
    pub fn new(base_url: impl Into<String>, user_id: Uuid, plan: Plan) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        HttpBatchApi {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id,
            plan,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("x-user-id", self.user_id.to_string())
            .header("x-user-plan", self.plan.as_str())
    }
}

#[async_trait]
impl BatchApi for HttpBatchApi {
    async fn create_batch(
        &self,
        kind: GenerationKind,
        parameters: &BatchParameters,
        target_count: i64,
    ) -> Result<Uuid, ApiError> {
        let path = format!("/api/v1/generation/{}/batches", kind.as_str());
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&serde_json::json!({
                "parameters": parameters,
                "target_count": target_count,
            }))
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::CREATED => {
                let body: Value = response.json().await.map_err(transport)?;
                body["queue_record_id"]
                    .as_str()
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| ApiError::Unexpected {
                        status: 201,
                        message: "response is missing queue_record_id".to_string(),
                    })
            }
            StatusCode::CONFLICT => Err(ApiError::AlreadyActive),
            status => Err(unexpected(status, response).await),
        }
    }

    async fn fetch_batch(&self, id: Uuid) -> Result<BatchSnapshot, ApiError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/api/v1/batches/{id}"))
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::OK => response.json::<BatchSnapshot>().await.map_err(transport),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            status => Err(unexpected(status, response).await),
        }
    }

    async fn advance_unit(&self, id: Uuid) -> Result<AdvanceResponse, ApiError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/api/v1/batches/{id}/advance"),
            )
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::OK => response.json::<AdvanceResponse>().await.map_err(transport),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            StatusCode::TOO_MANY_REQUESTS => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                Err(ApiError::QuotaExceeded {
                    used: body["used"].as_i64().unwrap_or(0),
                    limit: body["limit"].as_i64().unwrap_or(0),
                })
            }
            status => Err(unexpected(status, response).await),
        }
    }

    async fn cancel_batch(&self, id: Uuid) -> Result<BatchSnapshot, ApiError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/api/v1/batches/{id}/cancel"),
            )
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::OK => response.json::<BatchSnapshot>().await.map_err(transport),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            StatusCode::CONFLICT => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                let message = body["error"].as_str().unwrap_or("conflict").to_string();
                Err(ApiError::Conflict(message))
            }
            status => Err(unexpected(status, response).await),
        }
    }
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError::Transport(err.to_string())
}

async fn unexpected(status: StatusCode, response: reqwest::Response) -> ApiError {
    let message: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(512)
        .collect();

    ApiError::Unexpected {
        status: status.as_u16(),
        message,
    }
}
