//! `POST /ocr` handler.
//!
//! Accepts images as a raw base64 body, multipart fields, urlencoded
//! fields or a flat JSON object, and answers with the recognition result
//! per image. Feature flags come from the query string.

use axum::extract::State;
use serde::Deserialize;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::api::extractors::AppQuery;
use crate::api::payload::OcrPayload;
use crate::api::state::AppState;
use crate::error::{OcrGateError, Result};
use crate::ocr::FeatureFlags;
use crate::processing::ResponseBody;

#[derive(Debug, Default, Deserialize)]
pub struct OcrParams {
    pub det: Option<String>,
    pub rec: Option<String>,
    pub cls: Option<String>,
}

impl OcrParams {
    /// Missing flags take the configured defaults.
    pub fn resolve(&self, defaults: FeatureFlags) -> Result<FeatureFlags> {
        Ok(FeatureFlags {
            detect: flag("det", self.det.as_deref(), defaults.detect)?,
            recognize: flag("rec", self.rec.as_deref(), defaults.recognize)?,
            classify: flag("cls", self.cls.as_deref(), defaults.classify)?,
        })
    }
}

fn parse_query_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn flag(name: &str, raw: Option<&str>, default: bool) -> Result<bool> {
    match raw {
        None => Ok(default),
        Some(value) => parse_query_bool(value).ok_or_else(|| {
            OcrGateError::Validation(format!(
                "{name} must be one of true/false/1/0/yes/no/on/off, got '{value}'"
            ))
        }),
    }
}

/// `POST /ocr?det=&rec=&cls=`
pub async fn recognize(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<OcrParams>,
    OcrPayload(payload): OcrPayload,
) -> Result<ResponseBody> {
    let flags = params.resolve(state.config.dispatch.default_flags)?;

    let span = info_span!(
        "ocr_request",
        request_id = %Uuid::new_v4(),
        det = flags.detect,
        rec = flags.recognize,
        cls = flags.classify,
    );

    state
        .recognition
        .recognize(payload, flags)
        .instrument(span)
        .await
}
