use crate::error::ErrorEnvelope;
use crate::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Bearer API-key authentication. The resolved merchant rides in request
/// extensions; inactive merchants are rejected here even though their
/// historical rows stay readable through administrative tooling.
pub async fn require_merchant(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .unwrap_or("");

    if provided.is_empty() {
        return unauthorized("missing api key");
    }

    match state.merchants.find_by_api_key(provided).await {
        Ok(Some(merchant)) if merchant.is_active => {
            request.extensions_mut().insert(merchant);
            next.run(request).await
        }
        Ok(_) => unauthorized("invalid api key"),
        Err(e) => {
            tracing::error!("merchant lookup failed during authentication: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorEnvelope::new("INTERNAL_ERROR", "authentication unavailable")),
            )
                .into_response()
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorEnvelope::new("UNAUTHORIZED", message)),
    )
        .into_response()
}
