use axum::extract::rejection::QueryRejection;
use axum::extract::FromRequestParts;

use crate::error::OcrGateError;

/// `Query` whose rejection renders as an `invalid_request` envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(OcrGateError))]
pub struct AppQuery<T>(pub T);

impl From<QueryRejection> for OcrGateError {
    fn from(rejection: QueryRejection) -> Self {
        match rejection {
            QueryRejection::FailedToDeserializeQueryString(err) => {
                OcrGateError::Validation(format!("Invalid query string: {}", err.body_text()))
            }
            _ => OcrGateError::Validation(rejection.body_text()),
        }
    }
}
