//! Error types for the invoice server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use invoice_core::OverlayError;
use serde::Serialize;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error(transparent)]
    Processing(#[from] OverlayError),

    #[error("Download not found: {0}")]
    DownloadNotFound(String),

    #[error("Download expired: {0}")]
    DownloadExpired(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl ServerError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::InvalidUpload(_) => (StatusCode::BAD_REQUEST, "INVALID_UPLOAD"),
            ServerError::Processing(err) => match err {
                OverlayError::LoadError(_) => (StatusCode::BAD_REQUEST, "INVALID_PDF"),
                OverlayError::VatNotDetected => (StatusCode::UNPROCESSABLE_ENTITY, "VAT_NOT_DETECTED"),
                OverlayError::NoPricesFound => (StatusCode::UNPROCESSABLE_ENTITY, "NO_PRICES_FOUND"),
                OverlayError::InvalidRate(_) | OverlayError::InvalidValue(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_AMOUNT")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "PROCESSING_ERROR"),
            },
            ServerError::DownloadNotFound(_) => (StatusCode::NOT_FOUND, "DOWNLOAD_NOT_FOUND"),
            ServerError::DownloadExpired(_) => (StatusCode::GONE, "DOWNLOAD_EXPIRED"),
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
