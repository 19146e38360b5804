//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ingest::{IngestError, LedgerError};

/// Result type alias for server operations
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("{0}")]
    Ingest(#[from] IngestError),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// `{"error": {"message", "status"}}` with the given status
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = Json(json!({
        "error": {
            "message": message.into(),
            "status": status.as_u16(),
        }
    }));

    (status, body).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Ledger(ref e) => {
                tracing::error!("Ledger error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "A database error occurred".to_string())
            },
            AppError::Ingest(IngestError::NotFound(message)) => (StatusCode::NOT_FOUND, message),
            AppError::Ingest(ref e) => {
                tracing::error!("Ingestion error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            },
            AppError::NotFound(ref message) => (StatusCode::NOT_FOUND, message.clone()),
        };

        error_response(status, error_message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_not_found_maps_to_404() {
        let response =
            AppError::from(IngestError::NotFound("Unknown dataset source: x".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_of(response).await,
            json!({ "error": { "message": "Unknown dataset source: x", "status": 404 } })
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_keeps_message() {
        let response = AppError::from(IngestError::Upstream(
            "Failed to download NPPES: 503 Service Unavailable".into(),
        ))
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_of(response).await["error"]["message"],
            "Failed to download NPPES: 503 Service Unavailable"
        );
    }

    #[tokio::test]
    async fn test_ledger_error_hides_details() {
        let response = AppError::from(LedgerError::UnknownSource("x".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await["error"]["message"], "A database error occurred");
    }
}
