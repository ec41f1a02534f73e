use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::error::ApiResult;
use crate::state::AppState;

/// GET /models — sorted names of the installed model files.
pub async fn list_models(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let models = state.registry.list()?;
    log::info!("served /models request, found {} models", models.len());
    Ok(Json(json!({ "models": models })))
}
