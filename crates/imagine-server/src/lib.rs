pub mod config;
pub mod error;
pub mod job;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod stream;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::Method;
use axum::http::header::CONTENT_TYPE;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

/// Full application router with the CORS layer, shared between the
/// server binary and the integration tests.
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    Router::new()
        .merge(routes::api_routes())
        .layer(cors)
        .with_state(state)
}
