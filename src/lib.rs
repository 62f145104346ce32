pub mod config;
pub mod error;
pub mod state;
pub mod identity;
pub mod db;
pub mod models;
pub mod quota;
pub mod generation;
pub mod worker;
pub mod routes;
pub mod orchestrator;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::generation::ItemGenerator;
use crate::state::{AppState, SharedState};

pub fn build_app(pool: SqlitePool, config: Config, generator: Arc<dyn ItemGenerator>) -> Router {
    let state: SharedState = Arc::new(AppState {
        pool,
        config,
        generator,
    });

    Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
