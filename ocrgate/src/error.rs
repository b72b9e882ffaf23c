use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::api::response::{ApiResponse, ErrorCode};

#[derive(Error, Debug)]
pub enum OcrGateError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("OCR unavailable: {0}")]
    OcrUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl OcrGateError {
    pub fn code(&self) -> ErrorCode {
        match self {
            OcrGateError::Validation(_) | OcrGateError::Decode(_) | OcrGateError::Json(_) => {
                ErrorCode::InvalidRequest
            }
            OcrGateError::UnsupportedContentType(_) => ErrorCode::UnsupportedMediaType,
            OcrGateError::Ocr(_) => ErrorCode::UnprocessableImage,
            OcrGateError::OcrUnavailable(_) => ErrorCode::ServiceUnavailable,
            OcrGateError::Http(_) => ErrorCode::UpstreamError,
            OcrGateError::Config(_) | OcrGateError::Io(_) | OcrGateError::Internal(_) => {
                ErrorCode::InternalError
            }
        }
    }
}

impl IntoResponse for OcrGateError {
    fn into_response(self) -> Response {
        ApiResponse::<()>::from(self).into_response()
    }
}

pub type Result<T> = std::result::Result<T, OcrGateError>;
