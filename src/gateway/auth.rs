use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware,
    response::IntoResponse,
    Json,
};

use super::http::AppState;
use crate::error::ErrorBody;

/// Require `Authorization: Bearer <token>` when an API token is configured.
pub(crate) async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: middleware::Next,
) -> impl IntoResponse {
    let Some(ref expected) = state.api_token else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match provided {
        Some(token) if token_matches(token, expected) => {
            next.run(req).await
        }
        Some(_) => unauthorized("invalid token"),
        None => unauthorized("missing or invalid Authorization header"),
    }
}

fn unauthorized(message: &str) -> axum::response::Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": ErrorBody::new("Unauthorized", message) })),
    )
        .into_response()
}

fn token_matches(provided: &str, expected: &str) -> bool {
    ring::constant_time::verify_slices_are_equal(provided.as_bytes(), expected.as_bytes()).is_ok()
}
