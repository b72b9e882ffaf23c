use axum::body::Bytes;
use serde::Deserialize;
use thiserror::Error;

use crate::error::OcrGateError;
use crate::ocr::OcrResult;

/// What to do with input the gateway cannot read.
///
/// `Lenient` degrades unreadable input to an empty or `null` result and the
/// request still answers 200. `Strict` rejects it with a 4xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePolicy {
    #[default]
    Lenient,
    Strict,
}

impl DecodePolicy {
    pub fn is_strict(&self) -> bool {
        matches!(self, DecodePolicy::Strict)
    }
}

impl std::str::FromStr for DecodePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lenient" => Ok(DecodePolicy::Lenient),
            "strict" => Ok(DecodePolicy::Strict),
            other => Err(format!("expected 'lenient' or 'strict', got '{other}'")),
        }
    }
}

/// Why a single image produced no result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemFailure {
    /// The payload never became image bytes (bad base64, unreadable field).
    #[error("decode failed: {0}")]
    Decode(String),
    /// The engine rejected the image or failed while reading it.
    #[error("OCR failed: {0}")]
    Engine(String),
    #[error("OCR unavailable: {0}")]
    Unavailable(String),
}

impl From<OcrGateError> for ItemFailure {
    fn from(err: OcrGateError) -> Self {
        match err {
            OcrGateError::OcrUnavailable(reason) => ItemFailure::Unavailable(reason),
            OcrGateError::Decode(reason) => ItemFailure::Decode(reason),
            OcrGateError::Ocr(reason) => ItemFailure::Engine(reason),
            other => ItemFailure::Engine(other.to_string()),
        }
    }
}

impl From<ItemFailure> for OcrGateError {
    fn from(failure: ItemFailure) -> Self {
        match failure {
            ItemFailure::Decode(reason) => OcrGateError::Decode(reason),
            ItemFailure::Engine(reason) => OcrGateError::Ocr(reason),
            ItemFailure::Unavailable(reason) => OcrGateError::OcrUnavailable(reason),
        }
    }
}

/// One image extracted from a request.
///
/// `name` is the form/JSON key, `None` for an anonymous body. A payload that
/// failed to decode travels as `Err` so its key still shows up (as `null`)
/// in the response.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageItem {
    pub name: Option<String>,
    pub payload: Result<Bytes, ItemFailure>,
}

impl ImageItem {
    pub fn anonymous(bytes: impl Into<Bytes>) -> Self {
        Self {
            name: None,
            payload: Ok(bytes.into()),
        }
    }

    pub fn keyed(name: impl Into<String>, payload: Result<Bytes, ItemFailure>) -> Self {
        Self {
            name: Some(name.into()),
            payload,
        }
    }

    /// Payload size in bytes, 0 for failed payloads.
    pub fn size(&self) -> usize {
        self.payload.as_ref().map(|b| b.len()).unwrap_or(0)
    }
}

pub type OcrOutcome = Result<OcrResult, ItemFailure>;

/// Result for one dispatched item, in decoder order.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub name: Option<String>,
    pub outcome: OcrOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("lenient".parse::<DecodePolicy>(), Ok(DecodePolicy::Lenient));
        assert_eq!(" STRICT ".parse::<DecodePolicy>(), Ok(DecodePolicy::Strict));
        assert!("loose".parse::<DecodePolicy>().is_err());
        assert_eq!(DecodePolicy::default(), DecodePolicy::Lenient);
    }

    #[test]
    fn test_failure_error_round_trip_keeps_kind() {
        let err: OcrGateError = ItemFailure::Decode("bad".into()).into();
        assert!(matches!(err, OcrGateError::Decode(_)));

        let failure: ItemFailure = OcrGateError::OcrUnavailable("down".into()).into();
        assert_eq!(failure, ItemFailure::Unavailable("down".into()));

        let failure: ItemFailure = OcrGateError::Internal("boom".into()).into();
        assert!(matches!(failure, ItemFailure::Engine(_)));
    }

    #[test]
    fn test_item_size() {
        assert_eq!(ImageItem::anonymous(vec![1u8, 2, 3]).size(), 3);
        let failed = ImageItem::keyed("a", Err(ItemFailure::Decode("x".into())));
        assert_eq!(failed.size(), 0);
    }
}
