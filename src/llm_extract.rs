// src/llm_extract.rs

use crate::config::{LlmBackend, LlmSection};
use crate::error::{ModelError, ResponseParseError};
use crate::fields::{ExtractedFields, FIELDS};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Anything that turns a prompt into raw model text.
#[async_trait]
pub trait FieldModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

// ---------------------------------------------------------------------------
// Gemini generateContent
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

pub struct GeminiModel {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[async_trait]
impl FieldModel for GeminiModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig { temperature: 0.0 },
        };

        let model = self.model.trim_start_matches("models/");
        let url = format!("{}/models/{model}:generateContent", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, body });
        }

        let body: GenerateResponse = response.json().await?;
        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat/completions
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct OpenAiModel {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[async_trait]
impl FieldModel for OpenAiModel {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, body });
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(ModelError::EmptyResponse)
    }
}

/// Build the configured model client.
pub fn model_from_config(llm: &LlmSection) -> Box<dyn FieldModel> {
    let client = Client::new();
    let (base_url, model) = (llm.base_url().to_string(), llm.model().to_string());
    info!(backend = ?llm.backend, model = %model, url = %base_url, "Using model backend");
    match llm.backend {
        LlmBackend::Gemini => Box::new(GeminiModel {
            client,
            base_url,
            model,
            api_key: llm.api_key.clone(),
        }),
        LlmBackend::OpenAi => Box::new(OpenAiModel {
            client,
            base_url,
            model,
            api_key: llm.api_key.clone(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Prompt + response parsing
// ---------------------------------------------------------------------------

/// Empty-valued JSON object listing every field, one per line.
fn field_template() -> String {
    let body = FIELDS
        .iter()
        .map(|f| format!("  \"{f}\": \"\""))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("{{\n{body}\n}}")
}

/// First `max_chars` characters of `text`, never splitting a code point.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn build_prompt(text: &str, max_chars: usize) -> String {
    format!(
        "You are given the text of an invoice PDF.\n\
         Extract and return ONLY valid JSON in this exact structure:\n\
         {template}\n\n\
         If a field is not present, leave its value empty.\n\n\
         Invoice text:\n\
         {text}\n",
        template = field_template(),
        text = truncate_chars(text, max_chars),
    )
}

/// Greedy `{...}` span, allowed to cross newlines.
fn find_json_span(raw: &str) -> Option<&str> {
    let re = Regex::new(r"(?s)\{.*\}").ok()?;
    re.find(raw).map(|m| m.as_str())
}

fn parse_object(s: &str) -> Result<ExtractedFields, ResponseParseError> {
    match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) => Ok(ExtractedFields::from_json_object(map)),
        Ok(_) => Err(ResponseParseError::NotAnObject),
        Err(e) => Err(ResponseParseError::InvalidJson(e.to_string())),
    }
}

/// Parse raw model output into fields.
///
/// Tries the whole response first, then the widest `{...}` span in it, which
/// covers markdown fences and chatty preambles.
pub fn parse_model_response(raw: &str) -> Result<ExtractedFields, ResponseParseError> {
    if let Ok(fields) = parse_object(raw.trim()) {
        return Ok(fields);
    }
    let span = find_json_span(raw).ok_or(ResponseParseError::NoObject)?;
    parse_object(span)
}

/// Prompt the model with invoice text and turn its answer into fields.
pub struct FieldExtractor {
    model: Box<dyn FieldModel>,
    max_chars: usize,
}

impl FieldExtractor {
    pub fn new(model: Box<dyn FieldModel>, max_chars: usize) -> Self {
        Self { model, max_chars }
    }

    /// A failed model call is an error; an unusable answer is an empty field set.
    pub async fn extract(&self, text: &str) -> Result<ExtractedFields, ModelError> {
        let prompt = build_prompt(text, self.max_chars);
        let raw = self.model.generate(&prompt).await?;
        debug!(raw = %raw, "Model raw response");

        match parse_model_response(&raw) {
            Ok(fields) => {
                if fields.is_empty() {
                    warn!("Model returned no field values");
                }
                let (filled, total) = fields.coverage();
                info!(filled, total, "Model extraction result");
                Ok(fields)
            }
            Err(e) => {
                warn!(error = %e, response_len = raw.len(), "Unusable model response, using empty fields");
                Ok(ExtractedFields::empty())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CannedModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FieldModel for CannedModel {
        async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl FieldModel for FailingModel {
        async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            Err(ModelError::Api {
                status: 503,
                body: "overloaded".to_string(),
            })
        }
    }

    #[test]
    fn test_pure_json_and_wrapped_json_parse_the_same() {
        let json = r#"{"invoice_number": "INV-1", "total_amount_due": "100.00"}"#;
        let wrapped = format!("Sure! Here is the data:\n```json\n{json}\n```\nLet me know.");

        let a = parse_model_response(json).unwrap();
        let b = parse_model_response(&wrapped).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.get("invoice_number"), "INV-1");
    }

    #[test]
    fn test_no_braces_is_no_object() {
        assert_eq!(
            parse_model_response("I could not read this invoice."),
            Err(ResponseParseError::NoObject)
        );
    }

    #[test]
    fn test_broken_span_is_invalid_json() {
        let err = parse_model_response("prefix { not json } suffix").unwrap_err();
        assert!(matches!(err, ResponseParseError::InvalidJson(_)));
    }

    #[test]
    fn test_top_level_array_is_rejected() {
        assert_eq!(
            parse_model_response(r#"["a", "b"]"#),
            Err(ResponseParseError::NoObject)
        );
    }

    #[test]
    fn test_prompt_truncates_on_char_boundary() {
        let text = "é".repeat(10);
        let prompt = build_prompt(&text, 4);
        assert!(prompt.contains("éééé\n"));
        assert!(!prompt.contains("ééééé"));
    }

    #[test]
    fn test_prompt_lists_every_field() {
        let prompt = build_prompt("body", 8000);
        for f in FIELDS {
            assert!(prompt.contains(&format!("\"{f}\": \"\"")), "missing {f}");
        }
    }

    #[tokio::test]
    async fn test_extract_degrades_garbage_to_empty() {
        let model = CannedModel {
            reply: "no idea".to_string(),
            prompts: Mutex::new(Vec::new()),
        };
        let extractor = FieldExtractor::new(Box::new(model), 8000);
        let fields = extractor.extract("invoice text").await.unwrap();
        assert!(fields.is_empty());
    }

    #[tokio::test]
    async fn test_extract_sends_truncated_text() {
        let long_text = format!("{}TAIL", "a".repeat(8000));
        let model = std::sync::Arc::new(CannedModel {
            reply: r#"{"account_number": "ACC-9"}"#.to_string(),
            prompts: Mutex::new(Vec::new()),
        });

        struct Shared(std::sync::Arc<CannedModel>);
        #[async_trait]
        impl FieldModel for Shared {
            async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
                self.0.generate(prompt).await
            }
        }

        let extractor = FieldExtractor::new(Box::new(Shared(model.clone())), 8000);
        let fields = extractor.extract(&long_text).await.unwrap();
        assert_eq!(fields.get("account_number"), "ACC-9");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(!prompts[0].contains("TAIL"));
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let extractor = FieldExtractor::new(Box::new(FailingModel), 8000);
        let err = extractor.extract("text").await.unwrap_err();
        assert!(matches!(err, ModelError::Api { status: 503, .. }));
    }
}
