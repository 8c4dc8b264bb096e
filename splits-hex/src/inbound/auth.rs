//! Authentication middleware for the admin API.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};

use splits_repo::security::verify_api_key;
use splits_types::{PaymentProcessor, SplitRepository};

use super::handlers::AppState;

/// Extracts the API key from the Authorization header.
/// Expected format: "Bearer <api_key>" or just "<api_key>"
fn extract_api_key(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;
    Some(header.strip_prefix("Bearer ").unwrap_or(header).trim())
}

/// Guards `/api/admin/*`.
///
/// The presented key is hashed with SHA-256 and compared in constant time
/// against the configured hash. With no admin key configured every admin
/// request is refused.
pub async fn admin_auth_middleware<R: SplitRepository, P: PaymentProcessor>(
    State(state): State<Arc<AppState<R, P>>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected_hash) = state.admin_key_hash.as_deref() else {
        tracing::warn!("admin request refused: no admin API key configured");
        return unauthorized_response("Admin API is disabled");
    };

    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let api_key = match extract_api_key(auth_header) {
        Some(key) if !key.is_empty() => key,
        _ => {
            return unauthorized_response("Missing or invalid Authorization header");
        }
    };

    if !verify_api_key(api_key, expected_hash) {
        tracing::warn!(path = %request.uri().path(), "admin request with invalid API key");
        return unauthorized_response("Invalid API key");
    }

    next.run(request).await
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": message,
            "code": 401
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_api_key_bearer() {
        assert_eq!(
            extract_api_key(Some("Bearer admin_secret")),
            Some("admin_secret")
        );
    }

    #[test]
    fn test_extract_api_key_raw() {
        assert_eq!(extract_api_key(Some("admin_secret")), Some("admin_secret"));
    }

    #[test]
    fn test_extract_api_key_none() {
        assert_eq!(extract_api_key(None), None);
    }
}
