#![allow(dead_code)]

use std::io::Cursor;
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::{GrayImage, ImageFormat, Luma};
use tower::ServiceExt;

use ocrgate::api::{create_router, AppState};
use ocrgate::config::Config;
use ocrgate::error::{OcrGateError, Result};
use ocrgate::ocr::{FeatureFlags, OcrEngine, OcrLine, OcrResult, Rect};
use ocrgate::processing::DecodePolicy;

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Encode a `width` x `height` grayscale PNG. `dark` draws a black bar
/// across the middle; otherwise the image is blank white.
pub fn png(width: u32, height: u32, dark: bool) -> Vec<u8> {
    let img = GrayImage::from_fn(width, height, |_, y| {
        if dark && y >= height / 3 && y < height * 2 / 3 {
            Luma([0])
        } else {
            Luma([255])
        }
    });
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .expect("Failed to encode PNG fixture");
    buffer.into_inner()
}

pub fn b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub const BOUNDARY: &str = "ocrgate-test-boundary";

/// Build a `multipart/form-data` body with one file part per field.
pub fn multipart_body(fields: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, data) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}.png\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Deterministic engine: decodes the image, returns `[]` for an image with
/// no dark pixels and one line covering the dark rows otherwise. Bytes that
/// are not an image fail. Every call is recorded.
#[derive(Default)]
pub struct PixelEngine {
    calls: Mutex<Vec<(Vec<u8>, FeatureFlags)>>,
}

impl PixelEngine {
    pub fn calls(&self) -> Vec<(Vec<u8>, FeatureFlags)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl OcrEngine for PixelEngine {
    fn name(&self) -> &str {
        "pixel"
    }

    async fn recognize(&self, image: &[u8], flags: FeatureFlags) -> Result<OcrResult> {
        self.calls.lock().unwrap().push((image.to_vec(), flags));

        let img = image::load_from_memory(image)
            .map_err(|e| OcrGateError::Ocr(format!("Failed to decode image: {e}")))?
            .to_luma8();

        let dark_rows: Vec<u32> = img
            .rows()
            .enumerate()
            .filter_map(|(y, mut row)| row.any(|p| p.0[0] < 128).then_some(y as u32))
            .collect();

        let (Some(&first), Some(&last)) = (dark_rows.first(), dark_rows.last()) else {
            return Ok(OcrResult::default());
        };

        let rect = Rect {
            left: 0,
            top: first as i32,
            width: img.width() as i32,
            height: (last - first + 1) as i32,
        };
        Ok(OcrResult::new(vec![OcrLine {
            bbox: flags.detect.then(|| rect.quad()),
            text: flags.recognize.then(|| "bar".to_string()),
            confidence: flags.recognize.then_some(0.9),
        }]))
    }
}

/// Engine whose backend is always down.
pub struct UnavailableEngine;

#[async_trait]
impl OcrEngine for UnavailableEngine {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn recognize(&self, _image: &[u8], _flags: FeatureFlags) -> Result<OcrResult> {
        Err(OcrGateError::OcrUnavailable("engine offline".to_string()))
    }
}

pub fn test_config(policy: DecodePolicy) -> Config {
    let mut config = Config::default();
    config.ocr.language = "en".to_string();
    config.server.max_body_bytes = 1024 * 1024;
    config.dispatch.policy = policy;
    config.dispatch.default_flags = FeatureFlags::default();
    config.dispatch.max_concurrency = 4;
    config
}

pub fn build_app(engine: Arc<dyn OcrEngine>, policy: DecodePolicy) -> Router {
    init_test_logger();
    create_router(AppState::new(test_config(policy), engine))
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

pub async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let (status, body) = send(app, request).await;
    let json = serde_json::from_slice(&body)
        .unwrap_or_else(|e| panic!("Response is not JSON ({e}): {}", String::from_utf8_lossy(&body)));
    (status, json)
}

pub fn post_ocr(query: &str, content_type: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let uri = if query.is_empty() {
        "/ocr".to_string()
    } else {
        format!("/ocr?{query}")
    };
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(ct) = content_type {
        builder = builder.header("content-type", ct);
    }
    builder.body(body.into()).unwrap()
}
