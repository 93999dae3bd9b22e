//! Auth: caller identity from the `X-EMAIL-USER` header.
//!
//! An upstream proxy is expected to set the header. With `TEST_MODE` on, a
//! request without it is treated as `TEST_EMAIL`.

use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::config::AppConfig;
use crate::state::AppState;

pub const USER_HEADER: &str = "x-email-user";

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated caller. Use as a handler parameter to require identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub email: String,
}

/// Resolve the caller from the header value, falling back to the test
/// identity in test mode.
pub(crate) fn resolve_user(header: Option<&str>, config: &AppConfig) -> Option<String> {
    match header.map(str::trim).filter(|v| !v.is_empty()) {
        Some(email) => Some(email.to_string()),
        None if config.test_mode => Some(config.test_email.clone()),
        None => None,
    }
}

pub(crate) fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Unauthorized" }))).into_response()
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let header = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok());
        match resolve_user(header, &app_state.config) {
            Some(email) => Ok(Self { email }),
            None => {
                tracing::debug!(path = %parts.uri.path(), "auth: rejected request without identity");
                Err(unauthorized())
            }
        }
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `GET /test-auth`: echo the resolved identity.
pub async fn test_auth(State(state): State<AppState>, user: AuthUser) -> Json<serde_json::Value> {
    Json(json!({ "user_email": user.email, "test_mode": state.config.test_mode }))
}
