use crate::domain::merchant::Merchant;
use crate::domain::transaction::{CreatePaymentRequest, PaymentStatus, RefundRequest};
use crate::error::CoreError;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

pub async fn create_payment(
    State(state): State<AppState>,
    Extension(merchant): Extension<Merchant>,
    headers: HeaderMap,
    Json(req): Json<CreatePaymentRequest>,
) -> impl IntoResponse {
    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    // Runs detached from the connection: a client disconnect must not cancel
    // the ledger write for a charge the provider may already have accepted.
    let task = tokio::spawn(async move {
        state
            .orchestrator
            .create(&merchant, req, idempotency_key)
            .await
    });
    match task.await {
        Ok(Ok(view)) => (StatusCode::CREATED, Json(view)).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            tracing::error!("payment create task failed: {}", e);
            CoreError::Storage(anyhow::anyhow!("payment create task aborted")).into_response()
        }
    }
}

pub async fn get_payment(
    State(state): State<AppState>,
    Extension(merchant): Extension<Merchant>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.orchestrator.get(&merchant, id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Extension(merchant): Extension<Merchant>,
    Path(id): Path<Uuid>,
    Json(req): Json<RefundRequest>,
) -> impl IntoResponse {
    let task =
        tokio::spawn(async move { state.orchestrator.refund(&merchant, id, req).await });
    match task.await {
        Ok(Ok(view)) => (StatusCode::OK, Json(view)).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            tracing::error!("refund task failed: {}", e);
            CoreError::Storage(anyhow::anyhow!("refund task aborted")).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(merchant): Extension<Merchant>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(raw) => match PaymentStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return CoreError::Validation(format!("unknown status filter {raw}"))
                    .into_response()
            }
        },
    };

    match state
        .orchestrator
        .list(&merchant, status, params.limit, params.offset)
        .await
    {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
