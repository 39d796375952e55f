use crate::http::build_client;
use eyre::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SYSTEM_INSTRUCTIONS: &str = "You read casual speech and output only product names in a JSON \
object {\"products\": [...]}. Be concise (drop filler, remove superlatives), keep the canonical \
product name. Do not include URLs. Include specific models when present. Deduplicate.";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into()),
            api_key: std::env::var("GEMINI_API_KEY").ok(),
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Opaque extraction boundary: transcript in, distinct search-ready product
/// names out. Structured output is requested as JSON; the model still fences
/// it in markdown sometimes, so the fence is stripped before parsing.
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::new(GeminiConfig::from_env())
    }

    pub async fn extract_products(&self, transcript: &str) -> Result<Vec<String>, LlmError> {
        let api_key = self.config.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;

        let prompt = format!(
            "{SYSTEM_INSTRUCTIONS}\n\nTranscript:\n{transcript}\n\nReturn only the structured list of product names."
        );
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                response_mime_type: "application/json".into(),
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Http(format!("HTTP {}", response.status())));
        }

        let payload: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;

        let text = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| LlmError::InvalidResponse("missing candidate text".into()))?;

        parse_products_payload(&text)
            .ok_or_else(|| LlmError::InvalidResponse("unparseable product list".into()))
    }
}

/// Parse the model output into cleaned product names: fence stripped, names
/// trimmed, empties dropped, case-insensitive de-dup preserving first-seen
/// order. Accepts either `{"products": [...]}` or a bare JSON array.
pub fn parse_products_payload(raw: &str) -> Option<Vec<String>> {
    let cleaned = strip_markdown_fence(raw);
    let names: Vec<String> = match serde_json::from_str::<ProductListPayload>(&cleaned) {
        Ok(payload) => payload.products,
        Err(_) => serde_json::from_str::<Vec<String>>(&cleaned).ok()?,
    };

    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();
    for name in names {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            unique.push(trimmed.to_string());
        }
    }
    Some(unique)
}

fn strip_markdown_fence(input: &str) -> String {
    let trimmed = input.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut body = Vec::new();
    for line in trimmed.lines().skip(1) {
        if line.trim_start().starts_with("```") {
            break;
        }
        body.push(line);
    }
    body.join("\n")
}

#[derive(Debug, Deserialize)]
struct ProductListPayload {
    #[serde(default)]
    products: Vec<String>,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_payload() {
        let names =
            parse_products_payload(r#"{"products": ["MacBook Air M4", "Sony WH-1000XM5"]}"#)
                .expect("should parse");
        assert_eq!(names, vec!["MacBook Air M4", "Sony WH-1000XM5"]);
    }

    #[test]
    fn parses_bare_array_payload() {
        let names = parse_products_payload(r#"["iPhone 15"]"#).expect("should parse");
        assert_eq!(names, vec!["iPhone 15"]);
    }

    #[test]
    fn strips_markdown_fence() {
        let fenced = "```json\n{\"products\": [\"Kindle\"]}\n```";
        let names = parse_products_payload(fenced).expect("should parse");
        assert_eq!(names, vec!["Kindle"]);
    }

    #[test]
    fn dedupes_case_insensitively_preserving_order() {
        let names =
            parse_products_payload(r#"{"products": ["iPhone", "iphone", "IPHONE 15"]}"#)
                .expect("should parse");
        assert_eq!(names, vec!["iPhone", "IPHONE 15"]);
    }

    #[test]
    fn drops_blank_entries() {
        let names = parse_products_payload(r#"{"products": ["  ", "Kindle", ""]}"#)
            .expect("should parse");
        assert_eq!(names, vec!["Kindle"]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_products_payload("not json at all").is_none());
    }
}
