use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{OcrGateError, Result};
use crate::ocr::FeatureFlags;
use crate::processing::DecodePolicy;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_env_opt<T: std::str::FromStr>(var: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) if !val.trim().is_empty() => match val.parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Ignoring.", val, var, e);
                None
            }
        },
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub ocr: OcrConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    /// `local/tesseract` or `openai/<vision model>`.
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub language: String,
    pub model_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub max_image_dimension: u32,
    pub min_image_dimension: u32,
}

/// How a request is fanned out to the engine and how strictly bad input is
/// treated.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    pub max_concurrency: usize,
    pub policy: DecodePolicy,
    pub default_flags: FeatureFlags,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model: "local/tesseract".to_string(),
            api_key: None,
            base_url: None,
            language: "en".to_string(),
            model_dir: None,
            timeout_secs: 60,
            max_image_dimension: 4096,
            min_image_dimension: 1,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            policy: DecodePolicy::Lenient,
            default_flags: FeatureFlags::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let ocr_defaults = OcrConfig::default();
        let dispatch_defaults = DispatchConfig::default();

        Self {
            server: ServerConfig {
                host: env::var("OCRGATE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: parse_env_or("OCRGATE_PORT", 8000),
                max_body_bytes: parse_env_or("OCRGATE_MAX_BODY_BYTES", 32 * 1024 * 1024),
            },
            ocr: OcrConfig {
                model: env::var("OCR_MODEL").unwrap_or(ocr_defaults.model),
                api_key: env::var("OCR_API_KEY").ok(),
                base_url: env::var("OCR_BASE_URL").ok(),
                language: env::var("OCR_LANGUAGE").unwrap_or(ocr_defaults.language),
                model_dir: parse_env_opt("OCR_MODEL_DIR"),
                timeout_secs: parse_env_or("OCR_TIMEOUT", ocr_defaults.timeout_secs),
                max_image_dimension: parse_env_or(
                    "OCR_MAX_DIMENSION",
                    ocr_defaults.max_image_dimension,
                ),
                min_image_dimension: parse_env_or(
                    "OCR_MIN_DIMENSION",
                    ocr_defaults.min_image_dimension,
                ),
            },
            dispatch: DispatchConfig {
                max_concurrency: parse_env_or(
                    "OCR_MAX_CONCURRENCY",
                    dispatch_defaults.max_concurrency,
                )
                .max(1),
                policy: parse_env_or("OCR_DECODE_POLICY", dispatch_defaults.policy),
                default_flags: FeatureFlags {
                    detect: parse_env_or("OCR_DEFAULT_DET", dispatch_defaults.default_flags.detect),
                    recognize: parse_env_or(
                        "OCR_DEFAULT_REC",
                        dispatch_defaults.default_flags.recognize,
                    ),
                    classify: parse_env_or(
                        "OCR_DEFAULT_CLS",
                        dispatch_defaults.default_flags.classify,
                    ),
                },
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

impl OcrConfig {
    /// Ensures the configured model directory exists and returns its absolute
    /// form. `None` leaves model lookup to the engine's own defaults.
    pub fn resolve_model_dir(&self) -> Result<Option<PathBuf>> {
        self.model_dir
            .as_deref()
            .map(resolve_model_dir)
            .transpose()
    }
}

fn resolve_model_dir(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| {
        OcrGateError::Config(format!(
            "Cannot create model directory {}: {e}",
            dir.display()
        ))
    })?;
    if !dir.is_dir() {
        return Err(OcrGateError::Config(format!(
            "Model directory {} is not a directory",
            dir.display()
        )));
    }
    Ok(dir.canonicalize()?)
}

/// Split a model name into (provider, model).
pub fn parse_provider_model(model: &str) -> (&str, &str) {
    match model.split_once('/') {
        Some((prefix, rest)) => (prefix, rest),
        None => ("local", model),
    }
}
