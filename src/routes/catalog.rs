//! Read-only catalog routes: models, tools, data sources, app config.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde_json::{Value, json};

use crate::llm::registry::PublicModel;
use crate::services::prompt::DATA_SOURCES;
use crate::state::AppState;

/// `GET /api/llm_configs`: public model listing, default first.
pub async fn list_models(State(state): State<AppState>) -> Json<Vec<PublicModel>> {
    Json(state.models.list_public())
}

/// `POST /api/llm_configs/reload`: re-read the catalog file on the blocking
/// pool.
pub async fn reload_models(State(state): State<AppState>) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let models = Arc::clone(&state.models);
    match tokio::task::spawn_blocking(move || models.reload()).await {
        Ok(count) => Ok(Json(json!({ "status": "reloaded", "count": count }))),
        Err(e) => {
            tracing::error!(error = %e, "catalog: reload task failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "detail": "Catalog reload failed." }))))
        }
    }
}

/// `GET /api/tools`
pub async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "tools": state.tools.catalog() }))
}

/// `GET /api/data-sources`
pub async fn list_data_sources() -> Json<Value> {
    Json(json!({ "data_sources": DATA_SOURCES }))
}

/// `GET /api/config`
pub async fn app_config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "app_name": state.config.app_name, "version": env!("CARGO_PKG_VERSION") }))
}
