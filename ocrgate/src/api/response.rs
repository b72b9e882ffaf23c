//! JSON envelope for `/health` and for every error the gateway raises.
//! `/ocr` results are written bare and never go through here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::OcrGateError;

/// Wire error code, written as snake_case (`"invalid_request"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    UnsupportedMediaType,
    UnprocessableImage,
    InternalError,
    UpstreamError,
    ServiceUnavailable,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::UnprocessableImage => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamError => StatusCode::BAD_GATEWAY,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

/// Exactly one of `data` and `error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            status: StatusCode::OK,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
            status: code.status(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl<T: Serialize> From<OcrGateError> for ApiResponse<T> {
    /// Server-side failures are logged and answered with a generic message.
    fn from(err: OcrGateError) -> Self {
        let code = err.code();
        match err {
            OcrGateError::Validation(msg)
            | OcrGateError::UnsupportedContentType(msg)
            | OcrGateError::Decode(msg)
            | OcrGateError::Ocr(msg)
            | OcrGateError::OcrUnavailable(msg) => Self::error(code, msg),
            OcrGateError::Json(e) => Self::error(code, format!("Invalid JSON: {e}")),
            OcrGateError::Http(e) => {
                tracing::warn!(error = %e, "Upstream OCR backend failed");
                Self::error(code, "OCR backend request failed")
            }
            other @ (OcrGateError::Config(_) | OcrGateError::Io(_) | OcrGateError::Internal(_)) => {
                tracing::error!(error = %other, "Request failed with internal error");
                Self::error(code, "An internal error occurred")
            }
        }
    }
}
