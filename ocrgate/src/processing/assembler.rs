use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::Result;
use crate::ocr::OcrResult;

use super::decoder::InputShape;
use super::item::{DecodePolicy, ItemOutcome};

/// The `/ocr` response body.
///
/// - `Empty` serializes to `null`
/// - `Single` is a bare result (or `null` when the image failed)
/// - `Keyed` is an object in request order, failed keys mapped to `null`
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Single(Option<OcrResult>),
    Keyed(Vec<(String, Option<OcrResult>)>),
}

impl ResponseBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }

    /// Number of items that produced a result.
    pub fn succeeded(&self) -> usize {
        match self {
            ResponseBody::Empty => 0,
            ResponseBody::Single(result) => usize::from(result.is_some()),
            ResponseBody::Keyed(entries) => entries.iter().filter(|(_, r)| r.is_some()).count(),
        }
    }
}

impl Serialize for ResponseBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ResponseBody::Empty => serializer.serialize_none(),
            ResponseBody::Single(result) => result.serialize(serializer),
            ResponseBody::Keyed(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (name, result) in entries {
                    map.serialize_entry(name, result)?;
                }
                map.end()
            }
        }
    }
}

impl IntoResponse for ResponseBody {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Builds the response for one request from the dispatcher's outcomes.
///
/// Under [`DecodePolicy::Strict`] a failed anonymous image becomes an error
/// status instead of `null`. Keyed failures are always `null` so the other
/// keys survive.
pub fn assemble(
    shape: InputShape,
    outcomes: Vec<ItemOutcome>,
    policy: DecodePolicy,
) -> Result<ResponseBody> {
    match shape {
        InputShape::Empty => Ok(ResponseBody::Empty),
        InputShape::Anonymous => match outcomes.into_iter().next() {
            None => Ok(ResponseBody::Empty),
            Some(ItemOutcome { outcome: Ok(result), .. }) => Ok(ResponseBody::Single(Some(result))),
            Some(ItemOutcome { outcome: Err(failure), .. }) => {
                if policy.is_strict() {
                    return Err(failure.into());
                }
                Ok(ResponseBody::Single(None))
            }
        },
        InputShape::Keyed => {
            if outcomes.is_empty() {
                return Ok(ResponseBody::Empty);
            }
            let entries = outcomes
                .into_iter()
                .map(|item| (item.name.unwrap_or_default(), item.outcome.ok()))
                .collect();
            Ok(ResponseBody::Keyed(entries))
        }
    }
}
