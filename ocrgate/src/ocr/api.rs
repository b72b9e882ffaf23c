use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{parse_provider_model, OcrConfig};
use crate::error::{OcrGateError, Result};

use super::types::{FeatureFlags, OcrLine};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_RETRIES: u32 = 3;

/// OpenAI-compatible chat-completions client used as a remote OCR engine.
///
/// Vision models return text only, so lines carry no boxes or confidences.
#[derive(Clone, Debug)]
pub struct VisionApiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

impl VisionApiClient {
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| OcrGateError::Config("API key required for vision OCR".to_string()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let (_, model) = parse_provider_model(&config.model);

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url,
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn ocr(&self, png: &[u8], flags: FeatureFlags, language: &str) -> Result<Vec<OcrLine>> {
        if !flags.recognize {
            return Err(OcrGateError::Ocr(
                "Vision backend cannot run detection without recognition".to_string(),
            ));
        }

        let data_url = format!("data:image/png;base64,{}", STANDARD.encode(png));

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: build_prompt(flags, language),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            max_tokens: 4096,
        };

        let content = self.make_request(&request).await?;
        Ok(parse_lines(&content))
    }

    async fn make_request(&self, request: &ChatRequest) -> Result<String> {
        let mut retries = 0;

        loop {
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let chat_response: ChatResponse = resp.json().await.map_err(|e| {
                        OcrGateError::Ocr(format!("Failed to parse response: {e}"))
                    })?;

                    return chat_response
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .ok_or_else(|| OcrGateError::Ocr("No response from API".to_string()));
                }
                Ok(resp) if resp.status().as_u16() == 429 || resp.status().is_server_error() => {
                    retries += 1;
                    if retries >= MAX_RETRIES {
                        return Err(OcrGateError::Ocr(format!(
                            "API request failed after {MAX_RETRIES} retries: {}",
                            resp.status()
                        )));
                    }
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(OcrGateError::Ocr(format!(
                        "API request failed: {status} - {body}"
                    )));
                }
                Err(e) => {
                    retries += 1;
                    if retries >= MAX_RETRIES {
                        return Err(OcrGateError::Ocr(format!(
                            "API request failed after {MAX_RETRIES} retries: {e}"
                        )));
                    }
                }
            }

            let delay = Duration::from_millis(100 * 2_u64.pow(retries));
            tokio::time::sleep(delay).await;
        }
    }
}

fn build_prompt(flags: FeatureFlags, language: &str) -> String {
    let mut prompt = format!(
        "Extract all text from this image (language hint: {language}). \
         Return each line of text on its own line, top to bottom, \
         without explanations or formatting."
    );
    if flags.classify {
        prompt.push_str(" The image may be rotated; read the text in its upright orientation.");
    }
    prompt
}

fn parse_lines(content: &str) -> Vec<OcrLine> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| OcrLine {
            bbox: None,
            text: Some(l.to_string()),
            confidence: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(base_url: Option<String>) -> OcrConfig {
        OcrConfig {
            model: "openai/gpt-4o-mini".to_string(),
            api_key: Some("test-key".to_string()),
            base_url,
            timeout_secs: 5,
            ..OcrConfig::default()
        }
    }

    fn chat_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
    }

    #[test]
    fn test_client_requires_api_key() {
        let config = OcrConfig {
            api_key: None,
            ..create_test_config(None)
        };
        let err = VisionApiClient::new(&config).unwrap_err();
        assert!(err.to_string().contains("API key required"));
    }

    #[test]
    fn test_default_base_url_and_model() {
        let client = VisionApiClient::new(&create_test_config(None)).unwrap();
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert_eq!(client.model(), "gpt-4o-mini");
    }

    #[test]
    fn test_custom_base_url_trailing_slash() {
        let config = create_test_config(Some("https://custom.api.com/v1/".to_string()));
        let client = VisionApiClient::new(&config).unwrap();
        assert_eq!(client.base_url, "https://custom.api.com/v1");
    }

    #[test]
    fn test_parse_lines_skips_blank() {
        let lines = parse_lines("  Hello \n\nWorld\n");
        let texts: Vec<_> = lines.iter().map(|l| l.text.clone().unwrap()).collect();
        assert_eq!(texts, vec!["Hello", "World"]);
        assert!(lines.iter().all(|l| l.bbox.is_none()));
    }

    #[test]
    fn test_prompt_mentions_orientation_only_with_cls() {
        let mut flags = FeatureFlags::default();
        assert!(!build_prompt(flags, "en").contains("rotated"));
        flags.classify = true;
        assert!(build_prompt(flags, "en").contains("rotated"));
    }

    #[tokio::test]
    async fn test_ocr_returns_lines() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("INVOICE\nTotal 42")))
            .expect(1)
            .mount(&server)
            .await;

        let client = VisionApiClient::new(&create_test_config(Some(server.uri()))).unwrap();
        let lines = client.ocr(b"png", FeatureFlags::default(), "en").await.unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].text.as_deref(), Some("Total 42"));
    }

    #[tokio::test]
    async fn test_ocr_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad image"))
            .expect(1)
            .mount(&server)
            .await;

        let client = VisionApiClient::new(&create_test_config(Some(server.uri()))).unwrap();
        let err = client
            .ocr(b"png", FeatureFlags::default(), "en")
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("400"), "{err}");
        assert!(err.contains("bad image"), "{err}");
    }

    #[tokio::test]
    async fn test_ocr_server_error_retries_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(MAX_RETRIES as u64)
            .mount(&server)
            .await;

        let client = VisionApiClient::new(&create_test_config(Some(server.uri()))).unwrap();
        let err = client
            .ocr(b"png", FeatureFlags::default(), "en")
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("after 3 retries"), "{err}");
    }

    #[tokio::test]
    async fn test_ocr_without_recognition_fails_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("x")))
            .expect(0)
            .mount(&server)
            .await;

        let client = VisionApiClient::new(&create_test_config(Some(server.uri()))).unwrap();
        let flags = FeatureFlags {
            recognize: false,
            ..FeatureFlags::default()
        };
        assert!(client.ocr(b"png", flags, "en").await.is_err());
    }
}
