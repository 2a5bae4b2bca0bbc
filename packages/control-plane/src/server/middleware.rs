//! Bearer-token authentication. Every route except the health check passes
//! through here; the platform recognises a single shared API key.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use super::AppState;
use crate::common::ApiError;

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer_token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match bearer_token {
        Some(token) if token == state.api_key.as_str() => Ok(next.run(request).await),
        _ => Err(ApiError::ApiKeyIsInvalid),
    }
}
