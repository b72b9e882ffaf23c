use crate::config::OcrConfig;
use crate::error::{OcrGateError, Result};
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};

/// Image ready for an engine, plus the factor it was resized by.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// `prepared / original`; 1.0 when no resize happened.
    pub scale: f32,
}

/// Normalize image bytes before OCR
///
/// 1. Rejects payloads that are recognizably not images
/// 2. Decodes with a guessed format and validates the minimum dimension
/// 3. Downscales to the maximum dimension, keeping aspect ratio
/// 4. Converts to grayscale and stretches contrast
/// 5. Re-encodes as PNG
pub fn preprocess_image(bytes: &[u8], config: &OcrConfig) -> Result<PreparedImage> {
    if bytes.is_empty() {
        return Err(OcrGateError::Ocr("Empty image".to_string()));
    }

    if let Some(kind) = infer::get(bytes) {
        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(OcrGateError::Ocr(format!(
                "Not an image: detected {}",
                kind.mime_type()
            )));
        }
    }

    let img = ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| OcrGateError::Ocr(format!("Failed to read image: {e}")))?
        .decode()
        .map_err(|e| OcrGateError::Ocr(format!("Failed to decode image: {e}")))?;

    let (width, height) = img.dimensions();
    if width < config.min_image_dimension || height < config.min_image_dimension {
        return Err(OcrGateError::Ocr(format!(
            "Image too small: {}x{}, minimum {}x{}",
            width, height, config.min_image_dimension, config.min_image_dimension
        )));
    }

    let (img, scale) = resize_if_needed(img, config.max_image_dimension);
    let gray = enhance_grayscale_contrast(img.to_luma8());
    let (out_width, out_height) = gray.dimensions();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(gray)
        .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| OcrGateError::Ocr(format!("Failed to encode image: {e}")))?;

    Ok(PreparedImage {
        png,
        width: out_width,
        height: out_height,
        scale,
    })
}

/// Downscale with Lanczos3 when either side exceeds `max_dim`.
fn resize_if_needed(img: DynamicImage, max_dim: u32) -> (DynamicImage, f32) {
    let (width, height) = img.dimensions();
    if max_dim == 0 || (width <= max_dim && height <= max_dim) {
        return (img, 1.0);
    }

    let ratio = max_dim as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * ratio) as u32).max(1);
    let new_height = ((height as f32 * ratio) as u32).max(1);

    let resized = img.resize_exact(new_width, new_height, image::imageops::FilterType::Lanczos3);
    (resized, new_width as f32 / width as f32)
}

/// Histogram stretch: darkest pixel to 0, lightest to 255.
fn enhance_grayscale_contrast(gray: image::GrayImage) -> image::GrayImage {
    let (min_val, max_val) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));

    if max_val <= min_val {
        return gray;
    }

    let range = (max_val - min_val) as f32;
    image::GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let pixel = gray.get_pixel(x, y);
        let normalized = (pixel[0] - min_val) as f32 / range;
        image::Luma([(normalized * 255.0) as u8])
    })
}
