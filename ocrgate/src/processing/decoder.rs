//! Payload Decoder
//!
//! Turns whatever the client sent into a uniform list of [`ImageItem`]s.
//! The transport layer first reads the request into a [`Payload`] (one
//! variant per supported encoding); [`PayloadDecoder::decode`] then
//! produces a [`DecodedInput`] without ever looking at HTTP types.

use std::collections::HashMap;

use axum::body::Bytes;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;
use tracing::warn;

use crate::error::{OcrGateError, Result};

use super::item::{DecodePolicy, ImageItem, ItemFailure};

const MULTIPART: &str = "multipart/form-data";
const URL_ENCODED: &str = "application/x-www-form-urlencoded";
const JSON: &str = "application/json";

/// Request encoding, decided from the `Content-Type` header alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    /// No header: the whole body is one base64 image.
    Anonymous,
    Multipart,
    UrlEncoded,
    Json,
    Unsupported(String),
}

impl ContentKind {
    /// Match is trimmed and case-insensitive. `multipart/form-data` is a
    /// prefix match (it carries a boundary); the other types ignore
    /// parameters such as `; charset=utf-8`.
    pub fn classify(content_type: Option<&str>) -> Self {
        let Some(raw) = content_type else {
            return ContentKind::Anonymous;
        };

        let value = raw.trim().to_lowercase();
        if value.starts_with(MULTIPART) {
            return ContentKind::Multipart;
        }

        let essence = value.split(';').next().unwrap_or_default().trim();
        match essence {
            URL_ENCODED => ContentKind::UrlEncoded,
            JSON => ContentKind::Json,
            _ => ContentKind::Unsupported(value),
        }
    }
}

/// A multipart field as read off the wire. `data` is `Err` when the field
/// body could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
    pub name: String,
    pub data: std::result::Result<Bytes, String>,
}

/// The request body, read according to its [`ContentKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    RawBody(Bytes),
    /// `error` is set when the stream broke after `fields` were read.
    MultipartFields {
        fields: Vec<RawField>,
        error: Option<String>,
    },
    FormFields(Vec<(String, String)>),
    JsonFields(Bytes),
    Unsupported(String),
    /// The body could not be read as its declared encoding at all.
    Malformed(String),
}

/// Decoder output; the shape decides how the response is assembled.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedInput {
    Empty,
    Anonymous(ImageItem),
    Keyed(Vec<ImageItem>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    Empty,
    Anonymous,
    Keyed,
}

impl DecodedInput {
    pub fn shape(&self) -> InputShape {
        match self {
            DecodedInput::Empty => InputShape::Empty,
            DecodedInput::Anonymous(_) => InputShape::Anonymous,
            DecodedInput::Keyed(_) => InputShape::Keyed,
        }
    }

    pub fn into_items(self) -> Vec<ImageItem> {
        match self {
            DecodedInput::Empty => Vec::new(),
            DecodedInput::Anonymous(item) => vec![item],
            DecodedInput::Keyed(items) => items,
        }
    }
}

/// Base64 as clients actually send it: surrounding and embedded ASCII
/// whitespace is ignored, and a `data:<mime>;base64,` prefix is accepted.
pub fn decode_base64(input: &[u8]) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let mut cleaned: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    if cleaned.starts_with(b"data:") {
        if let Some(pos) = cleaned.windows(8).position(|w| w == b";base64,") {
            cleaned.drain(..pos + 8);
        }
    }

    STANDARD.decode(&cleaned)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadDecoder {
    pub(crate) policy: DecodePolicy,
}

impl PayloadDecoder {
    pub fn new(policy: DecodePolicy) -> Self {
        Self { policy }
    }

    /// Only fails under [`DecodePolicy::Strict`]; lenient decoding never
    /// errors and degrades unreadable input to [`DecodedInput::Empty`] or
    /// per-item failures.
    pub fn decode(&self, payload: Payload) -> Result<DecodedInput> {
        match payload {
            Payload::RawBody(body) => self.decode_anonymous(&body),
            Payload::MultipartFields { fields, error } => {
                if let Some(error) = error {
                    self.degrade(OcrGateError::Decode(format!(
                        "Malformed multipart body: {error}"
                    )))?;
                }
                let mut items = KeyedItems::default();
                for field in fields {
                    items.insert(field.name, field.data.map_err(ItemFailure::Decode));
                }
                self.keyed(items.into_vec())
            }
            Payload::FormFields(fields) => {
                let mut items = KeyedItems::default();
                for (name, value) in fields {
                    let payload = decode_field(value.as_bytes());
                    items.insert(name, payload);
                }
                self.keyed(items.into_vec())
            }
            Payload::JsonFields(body) => self.decode_json(&body),
            Payload::Unsupported(content_type) => {
                self.degrade(OcrGateError::UnsupportedContentType(content_type))?;
                Ok(DecodedInput::Empty)
            }
            Payload::Malformed(reason) => {
                self.degrade(OcrGateError::Decode(reason))?;
                Ok(DecodedInput::Empty)
            }
        }
    }

    fn decode_anonymous(&self, body: &[u8]) -> Result<DecodedInput> {
        if body.is_empty() {
            return Ok(DecodedInput::Empty);
        }

        match decode_base64(body) {
            Ok(bytes) if bytes.is_empty() => Ok(DecodedInput::Empty),
            Ok(bytes) => Ok(DecodedInput::Anonymous(ImageItem::anonymous(bytes))),
            Err(e) => {
                self.degrade(OcrGateError::Decode(format!("Request body is not base64: {e}")))?;
                Ok(DecodedInput::Empty)
            }
        }
    }

    fn decode_json(&self, body: &[u8]) -> Result<DecodedInput> {
        let object = match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(object)) => object,
            Ok(other) => {
                self.degrade(OcrGateError::Decode(format!(
                    "JSON body must be an object of base64 strings, got {}",
                    json_type(&other)
                )))?;
                return Ok(DecodedInput::Empty);
            }
            Err(e) => {
                self.degrade(OcrGateError::Decode(format!("Malformed JSON body: {e}")))?;
                return Ok(DecodedInput::Empty);
            }
        };

        let items = object
            .into_iter()
            .map(|(name, value)| {
                let payload = match value {
                    Value::String(s) => decode_field(s.as_bytes()),
                    other => Err(ItemFailure::Decode(format!(
                        "expected a base64 string, got {}",
                        json_type(&other)
                    ))),
                };
                ImageItem::keyed(name, payload)
            })
            .collect();
        self.keyed(items)
    }

    fn keyed(&self, items: Vec<ImageItem>) -> Result<DecodedInput> {
        for item in &items {
            if let Err(failure) = &item.payload {
                let name = item.name.as_deref().unwrap_or_default();
                warn!(name = %name, error = %failure, "Undecodable field, answering null");
                if self.policy.is_strict() {
                    return Err(OcrGateError::Decode(format!("field `{name}`: {failure}")));
                }
            }
        }
        Ok(DecodedInput::Keyed(items))
    }

    /// Log unreadable input; under the strict policy, reject it instead.
    fn degrade(&self, err: OcrGateError) -> Result<()> {
        if self.policy.is_strict() {
            return Err(err);
        }
        warn!(error = %err, "Ignoring unreadable request input");
        Ok(())
    }
}

fn decode_field(value: &[u8]) -> std::result::Result<Bytes, ItemFailure> {
    decode_base64(value)
        .map(Bytes::from)
        .map_err(|e| ItemFailure::Decode(format!("invalid base64: {e}")))
}

/// Keyed items in first-seen order. A repeated name replaces the earlier
/// payload but keeps its position.
#[derive(Default)]
struct KeyedItems {
    items: Vec<ImageItem>,
    index: HashMap<String, usize>,
}

impl KeyedItems {
    fn insert(&mut self, name: String, payload: std::result::Result<Bytes, ItemFailure>) {
        match self.index.get(&name) {
            Some(&pos) => self.items[pos].payload = payload,
            None => {
                self.index.insert(name.clone(), self.items.len());
                self.items.push(ImageItem::keyed(name, payload));
            }
        }
    }

    fn into_vec(self) -> Vec<ImageItem> {
        self.items
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
