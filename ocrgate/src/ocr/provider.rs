use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leptess::{LepTess, Variable};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::{parse_provider_model, OcrConfig};
use crate::error::{OcrGateError, Result};

use super::api::VisionApiClient;
use super::preprocessing::{preprocess_image, PreparedImage};
use super::types::{FeatureFlags, OcrLine, OcrResult, Rect};
use super::OcrEngine;

enum OcrBackend {
    Local { tesseract: Arc<Mutex<LepTess>> },
    Api { client: VisionApiClient },
}

/// The process-wide OCR engine, built once at startup.
pub struct OcrProvider {
    backend: OcrBackend,
    name: String,
    config: OcrConfig,
}

/// Map short language codes (`en`, `ch`, `japan`, ...) onto Tesseract
/// traineddata names. Unknown codes pass through unchanged.
pub fn tesseract_language(code: &str) -> String {
    let mapped = match code.to_lowercase().as_str() {
        "en" => "eng",
        "ch" => "chi_sim",
        "chinese_cht" => "chi_tra",
        "japan" | "ja" => "jpn",
        "korean" | "ko" => "kor",
        "french" | "fr" => "fra",
        "german" | "de" => "deu",
        "es" => "spa",
        "it" => "ita",
        "pt" => "por",
        "ru" => "rus",
        "ar" => "ara",
        _ => return code.to_string(),
    };
    mapped.to_string()
}

fn create_tesseract(config: &OcrConfig) -> Result<LepTess> {
    let data_path = match &config.model_dir {
        Some(dir) => Some(dir.to_str().ok_or_else(|| {
            OcrGateError::Config(format!("Model dir is not valid UTF-8: {}", dir.display()))
        })?),
        None => None,
    };
    let language = tesseract_language(&config.language);

    LepTess::new(data_path, &language)
        .map_err(|e| OcrGateError::Config(format!("Tesseract ({language}) not available: {e}")))
}

impl OcrProvider {
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let (provider, model) = parse_provider_model(&config.model);

        let (backend, name) = match provider.to_lowercase().as_str() {
            "openai" => {
                let client = VisionApiClient::new(config)?;
                info!(model = %model, "Vision OCR API backend initialized");
                (OcrBackend::Api { client }, format!("openai/{model}"))
            }
            "local" => {
                let lt = create_tesseract(config)?;
                info!(
                    language = %tesseract_language(&config.language),
                    model_dir = ?config.model_dir,
                    "Tesseract OCR initialized"
                );
                (
                    OcrBackend::Local {
                        tesseract: Arc::new(Mutex::new(lt)),
                    },
                    "local/tesseract".to_string(),
                )
            }
            other => {
                return Err(OcrGateError::Config(format!(
                    "Unknown OCR provider '{other}' in model '{}'",
                    config.model
                )))
            }
        };

        Ok(Self {
            backend,
            name,
            config: config.clone(),
        })
    }

    async fn ocr_internal(&self, image: &[u8], flags: FeatureFlags) -> Result<OcrResult> {
        if !flags.detect && !flags.recognize {
            return Err(OcrGateError::Ocr(
                "At least one of det or rec must be enabled".to_string(),
            ));
        }

        let bytes = image.to_vec();
        let config = self.config.clone();
        let prepared = tokio::task::spawn_blocking(move || preprocess_image(&bytes, &config))
            .await
            .map_err(|e| OcrGateError::Internal(format!("Preprocessing task panicked: {e}")))??;

        match &self.backend {
            OcrBackend::Local { tesseract } => {
                let lines =
                    with_engine(tesseract, move |lt| run_tesseract(lt, &prepared, flags)).await??;

                Ok(OcrResult::new(lines))
            }
            OcrBackend::Api { client } => {
                let lines = client
                    .ocr(&prepared.png, flags, &self.config.language)
                    .await?;
                Ok(OcrResult::new(lines))
            }
        }
    }
}

#[async_trait]
impl OcrEngine for OcrProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(&self, image: &[u8], flags: FeatureFlags) -> Result<OcrResult> {
        let timeout_duration = Duration::from_secs(self.config.timeout_secs);

        match tokio::time::timeout(timeout_duration, self.ocr_internal(image, flags)).await {
            Ok(inner_result) => inner_result,
            Err(_) => Err(OcrGateError::OcrUnavailable(format!(
                "OCR operation timed out after {} seconds",
                self.config.timeout_secs
            ))),
        }
    }
}

/// Waits for the engine lock on the async side, then runs `f` on the
/// blocking pool. Callers dropped while queued never start any work.
async fn with_engine<T, R, F>(engine: &Arc<Mutex<T>>, f: F) -> Result<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnOnce(&mut T) -> R + Send + 'static,
{
    let mut guard = Arc::clone(engine).lock_owned().await;
    tokio::task::spawn_blocking(move || f(&mut *guard))
        .await
        .map_err(|e| OcrGateError::Internal(format!("OCR task panicked: {e}")))
}

/// Tesseract page segmentation mode for a flag combination.
///
/// Without detection the image is read as a single text line; with
/// classification Tesseract runs orientation and script detection first.
fn page_seg_mode(flags: FeatureFlags) -> &'static str {
    if !flags.detect {
        "7"
    } else if flags.classify {
        "1"
    } else {
        "3"
    }
}

fn run_tesseract(lt: &mut LepTess, image: &PreparedImage, flags: FeatureFlags) -> Result<Vec<OcrLine>> {
    lt.set_variable(Variable::TesseditPagesegMode, page_seg_mode(flags))
        .map_err(|e| OcrGateError::Ocr(format!("Failed to set page segmentation: {e}")))?;
    lt.set_image_from_mem(&image.png)
        .map_err(|e| OcrGateError::Ocr(format!("Failed to set image: {e}")))?;

    if flags.detect {
        let tsv = lt
            .get_tsv_text(0)
            .map_err(|e| OcrGateError::Ocr(format!("Failed to extract text: {e}")))?;
        let words = parse_tsv_words(&tsv);
        return Ok(group_lines(words, flags.recognize, image.scale));
    }

    let text = lt
        .get_utf8_text()
        .map_err(|e| OcrGateError::Ocr(format!("Failed to extract text: {e}")))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let confidence = lt.mean_text_conf().max(0) as f32 / 100.0;
    Ok(vec![OcrLine {
        bbox: None,
        text: Some(text.split_whitespace().collect::<Vec<_>>().join(" ")),
        confidence: Some(confidence),
    }])
}

#[derive(Debug, Clone, PartialEq)]
struct TsvWord {
    /// (block, paragraph, line)
    line_key: (u32, u32, u32),
    rect: Rect,
    confidence: f32,
    text: String,
}

/// Word rows (level 5) from Tesseract TSV output.
///
/// Columns: level page_num block_num par_num line_num word_num left top
/// width height conf text
fn parse_tsv_words(tsv: &str) -> Vec<TsvWord> {
    tsv.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 12 || fields[0] != "5" {
                return None;
            }
            let num = |i: usize| fields[i].trim().parse::<i64>().ok();
            let confidence = fields[10].trim().parse::<f32>().ok()?;
            let text = fields[11].trim();
            if confidence < 0.0 || text.is_empty() {
                return None;
            }
            Some(TsvWord {
                line_key: (num(2)? as u32, num(3)? as u32, num(4)? as u32),
                rect: Rect {
                    left: num(6)? as i32,
                    top: num(7)? as i32,
                    width: num(8)? as i32,
                    height: num(9)? as i32,
                },
                confidence: confidence / 100.0,
                text: text.to_string(),
            })
        })
        .collect()
}

/// Merge consecutive words sharing a line key. Boxes are mapped back to the
/// caller's coordinate space through `scale`.
fn group_lines(words: Vec<TsvWord>, with_text: bool, scale: f32) -> Vec<OcrLine> {
    let mut grouped: Vec<((u32, u32, u32), Rect, Vec<TsvWord>)> = Vec::new();
    for word in words {
        match grouped.last_mut() {
            Some((key, rect, members)) if *key == word.line_key => {
                *rect = rect.union(&word.rect);
                members.push(word);
            }
            _ => grouped.push((word.line_key, word.rect, vec![word])),
        }
    }

    grouped
        .into_iter()
        .map(|(_, rect, members)| {
            let bbox = Some(rect.unscale(scale).quad());
            if !with_text {
                return OcrLine {
                    bbox,
                    text: None,
                    confidence: None,
                };
            }
            let confidence =
                members.iter().map(|w| w.confidence).sum::<f32>() / members.len() as f32;
            let text = members
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            OcrLine {
                bbox,
                text: Some(text),
                confidence: Some(confidence),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t200\t100\t-1\t
4\t1\t1\t1\t1\t0\t10\t10\t90\t12\t-1\t
5\t1\t1\t1\t1\t1\t10\t10\t40\t12\t96.5\tHello
5\t1\t1\t1\t1\t2\t60\t11\t40\t11\t91.5\tworld
5\t1\t1\t1\t2\t1\t10\t30\t30\t12\t80\tBye
5\t1\t1\t1\t2\t2\t50\t30\t10\t12\t-1\t
";

    #[test]
    fn test_tesseract_language_mapping() {
        assert_eq!(tesseract_language("en"), "eng");
        assert_eq!(tesseract_language("CH"), "chi_sim");
        assert_eq!(tesseract_language("japan"), "jpn");
        assert_eq!(tesseract_language("eng+deu"), "eng+deu");
    }

    #[test]
    fn test_page_seg_mode() {
        let mut flags = FeatureFlags::default();
        assert_eq!(page_seg_mode(flags), "3");
        flags.classify = true;
        assert_eq!(page_seg_mode(flags), "1");
        flags.detect = false;
        assert_eq!(page_seg_mode(flags), "7");
    }

    #[test]
    fn test_parse_tsv_words_keeps_only_words() {
        let words = parse_tsv_words(TSV);
        assert_eq!(words.len(), 3);
        assert_eq!(words[0].text, "Hello");
        assert_eq!(words[0].line_key, (1, 1, 1));
        assert!((words[0].confidence - 0.965).abs() < 1e-6);
        assert_eq!(words[2].line_key, (1, 1, 2));
    }

    #[test]
    fn test_group_lines_with_text() {
        let lines = group_lines(parse_tsv_words(TSV), true, 1.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text.as_deref(), Some("Hello world"));
        assert_eq!(lines[0].bbox, Some([[10, 10], [100, 10], [100, 22], [10, 22]]));
        assert!((lines[0].confidence.unwrap() - 0.94).abs() < 1e-6);
        assert_eq!(lines[1].text.as_deref(), Some("Bye"));
    }

    #[test]
    fn test_group_lines_detection_only_and_scaled() {
        let lines = group_lines(parse_tsv_words(TSV), false, 0.5);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.text.is_none() && l.confidence.is_none()));
        assert_eq!(lines[1].bbox, Some([[20, 60], [80, 60], [80, 84], [20, 84]]));
    }

    #[test]
    fn test_empty_tsv_yields_no_lines() {
        assert!(group_lines(parse_tsv_words(""), true, 1.0).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queued_engine_calls_give_up_on_timeout() {
        let engine = Arc::new(Mutex::new(0u32));

        let busy = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                with_engine(&engine, |runs| {
                    std::thread::sleep(Duration::from_millis(200));
                    *runs += 1;
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let queued = with_engine(&engine, |runs| *runs += 1);
        let waited = tokio::time::timeout(Duration::from_millis(50), queued).await;
        assert!(waited.is_err(), "queued call should still be waiting");

        busy.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*engine.lock().await, 1);
    }

    #[tokio::test]
    async fn test_engine_panic_is_internal_error() {
        let engine = Arc::new(Mutex::new(()));
        let err = with_engine(&engine, |_| -> u32 { panic!("boom") })
            .await
            .unwrap_err();
        assert!(matches!(err, OcrGateError::Internal(_)));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let config = OcrConfig {
            model: "acme/ocr-9000".to_string(),
            ..OcrConfig::default()
        };
        let err = OcrProvider::new(&config).err().expect("should fail");
        assert!(err.to_string().contains("Unknown OCR provider"));
    }

    #[test]
    fn test_api_provider_without_key_fails_to_construct() {
        let config = OcrConfig {
            model: "openai/gpt-4o".to_string(),
            api_key: None,
            ..OcrConfig::default()
        };
        assert!(OcrProvider::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_api_provider_rejects_flags_without_stages() {
        let config = OcrConfig {
            model: "openai/gpt-4o".to_string(),
            api_key: Some("test-key".to_string()),
            base_url: Some("http://127.0.0.1:9".to_string()),
            ..OcrConfig::default()
        };
        let provider = OcrProvider::new(&config).unwrap();
        assert_eq!(provider.name(), "openai/gpt-4o");

        let flags = FeatureFlags {
            detect: false,
            recognize: false,
            classify: true,
        };
        let err = provider.recognize(b"irrelevant", flags).await.unwrap_err();
        assert!(err.to_string().contains("det or rec"));
    }
}
