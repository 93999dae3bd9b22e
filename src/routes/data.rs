//! Canned sample datasets and the bare app settings view.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{Value, json};

use crate::routes::auth::AuthUser;
use crate::state::AppState;

/// Rows for a named dataset, or `None` when the name is unknown.
fn dataset(name: &str) -> Option<Value> {
    match name {
        "customers" => Some(json!([
            { "id": 1, "name": "Alice Smith", "email": "alice@example.com" },
            { "id": 2, "name": "Bob Johnson", "email": "bob@example.com" },
        ])),
        "products" => Some(json!([
            { "id": 101, "name": "Laptop", "price": 1200.00 },
            { "id": 102, "name": "Mouse", "price": 25.00 },
        ])),
        _ => None,
    }
}

/// `GET /data/{data_source_name}`
pub async fn get_data(auth: AuthUser, Path(name): Path<String>) -> Response {
    match dataset(&name) {
        Some(rows) => Json(rows).into_response(),
        None => {
            tracing::debug!(%name, user = %auth.email, "data: unknown data source");
            (StatusCode::NOT_FOUND, Json(json!({ "detail": "Data source not found" }))).into_response()
        }
    }
}

/// `GET /app_settings`
pub async fn app_settings(State(state): State<AppState>, _auth: AuthUser) -> Json<Value> {
    Json(json!({ "app_name": state.config.app_name }))
}
