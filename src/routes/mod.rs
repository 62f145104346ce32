pub mod batches;
pub mod items;
pub mod quota;

use axum::routing::{get, post};
use axum::Router;

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/api/v1/generation/{kind}/batches", post(batches::create))
        .route(
            "/api/v1/generation/{kind}/batches/active",
            get(batches::active),
        )
        .route("/api/v1/generation/{kind}/quota", get(quota::current))
        .route("/api/v1/batches/{id}", get(batches::get_one))
        .route("/api/v1/batches/{id}/advance", post(batches::advance))
        .route("/api/v1/batches/{id}/cancel", post(batches::cancel))
        .route("/api/v1/items", get(items::list))
}
