use crate::domain::transaction::PspProvider;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("operation not allowed in current state: {0}")]
    InvalidState(String),

    #[error("no connector registered for provider {0}")]
    UnsupportedProvider(PspProvider),

    #[error("provider {provider} call failed: {message}")]
    Provider {
        provider: PspProvider,
        kind: Option<String>,
        message: String,
    },

    #[error("webhook signature verification failed")]
    SignatureInvalid,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl CoreError {
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::InvalidState(_) => "INVALID_STATE",
            CoreError::UnsupportedProvider(_) => "UNSUPPORTED_PROVIDER",
            CoreError::Provider { .. } => "PROVIDER_ERROR",
            CoreError::SignatureInvalid => "SIGNATURE_INVALID",
            CoreError::Storage(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) | CoreError::InvalidState(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::UnsupportedProvider(_) | CoreError::Provider { .. } => StatusCode::BAD_GATEWAY,
            CoreError::SignatureInvalid => StatusCode::UNAUTHORIZED,
            CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: &str, message: &str) -> Self {
        ErrorEnvelope {
            error: ErrorPayload {
                code: code.to_string(),
                message: message.to_string(),
                details: None,
            },
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let details = match &self {
            CoreError::Provider { kind, .. } => kind.clone(),
            _ => None,
        };
        let mut envelope = ErrorEnvelope::new(self.code(), &self.to_string());
        envelope.error.details = details;
        (self.status_code(), Json(envelope)).into_response()
    }
}
