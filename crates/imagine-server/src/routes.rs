use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

mod generate;
mod models;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate", post(generate::generate))
        .route("/models", get(models::list_models))
}
