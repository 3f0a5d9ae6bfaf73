use crate::domain::transaction::PspProvider;
use crate::error::ErrorEnvelope;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

pub async fn provider_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(provider) = PspProvider::parse(&provider) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorEnvelope::new("NOT_FOUND", "unknown provider")),
        )
            .into_response();
    };

    let signature = headers
        .get("X-Webhook-Signature")
        .and_then(|h| h.to_str().ok());

    match state.reconciler.handle(provider, &body, signature).await {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response(),
        Err(e) => e.into_response(),
    }
}
