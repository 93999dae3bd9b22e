//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the chat API, the catalog and sample-data endpoints, and the optional websocket
//! channel under one Axum router. Anything unmatched falls through to the
//! static frontend in `STATIC_DIR`.

pub mod auth;
pub mod catalog;
pub mod chat;
pub mod data;
pub mod ws;

use axum::Router;
use axum::response::Json;
use axum::routing::{get, post};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/test-auth", get(auth::test_auth))
        .route("/chat", post(chat::create_session))
        .route("/chat/{id}", get(chat::get_session).delete(chat::delete_session))
        .route("/chat/{id}/message", post(chat::send_message))
        .route("/chat/{id}/download", get(chat::download_session))
        .route("/api/llm_configs", get(catalog::list_models))
        .route("/api/llm_configs/reload", post(catalog::reload_models))
        .route("/api/tools", get(catalog::list_tools))
        .route("/api/data-sources", get(catalog::list_data_sources))
        .route("/api/config", get(catalog::app_config))
        .route("/data/{data_source_name}", get(data::get_data))
        .route("/app_settings", get(data::app_settings));

    if !state.config.disable_websocket {
        router = router.route("/ws", get(ws::handle_ws));
    }

    let static_files = ServeDir::new(&state.config.static_dir).append_index_html_on_directories(true);

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .fallback_service(static_files)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
