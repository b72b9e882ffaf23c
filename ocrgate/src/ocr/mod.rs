//! OCR (Optical Character Recognition) Module
//!
//! Defines the engine contract the request pipeline depends on and the
//! engines shipped with the gateway.
//!
//! # Architecture
//!
//! - [`OcrEngine`] is the seam: `recognize(image bytes, flags) -> OcrResult`.
//!   The pipeline only ever sees an `Arc<dyn OcrEngine>`, so tests plug in
//!   fakes.
//! - [`OcrProvider`] is the production engine. `local/*` models run
//!   Tesseract through leptess; `openai/<model>` models call an
//!   OpenAI-compatible vision API.
//! - [`preprocess_image`] normalizes every image before it reaches a
//!   backend.
//!
//! # Usage
//!
//! ```rust,ignore
//! let engine: Arc<dyn OcrEngine> = Arc::new(OcrProvider::new(&config.ocr)?);
//! let result = engine.recognize(&image_bytes, FeatureFlags::default()).await?;
//! ```

mod api;
mod preprocessing;
mod provider;
mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use preprocessing::{preprocess_image, PreparedImage};
pub use provider::{tesseract_language, OcrProvider};
pub use types::{FeatureFlags, OcrLine, OcrResult, Point, Rect};

/// Something that turns image bytes into text lines.
///
/// Implementations must be safe to call from many requests at once; an
/// engine that is not thread-safe internally serializes access itself.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Identifier used in logs and the health endpoint.
    fn name(&self) -> &str;

    async fn recognize(&self, image: &[u8], flags: FeatureFlags) -> Result<OcrResult>;
}
