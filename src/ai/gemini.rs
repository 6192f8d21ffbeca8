//! Gemini `generateContent` API client.
//!
//! Thin HTTP wrapper over the Generative Language REST endpoint. Pure parsing
//! in `parse_response` for testability. The API key is a required construction
//! argument; there is no ambient-credential fallback.

use std::time::Duration;

use super::{AiError, GenerateText};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT_SECS: u64 = 35;
const CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// CLIENT
// =============================================================================

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// # Errors
    ///
    /// `MissingApiKey` when the key is empty, `HttpClientBuild` if the HTTP
    /// client cannot be constructed.
    pub fn new(api_key: String, model: String) -> Result<Self, AiError> {
        if api_key.is_empty() {
            return Err(AiError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key, model })
    }

    /// The configured model name.
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl GenerateText for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let url = format!("{API_BASE}/{}:generateContent", self.model);
        let body = ApiRequest { contents: vec![Content { parts: vec![Part { text: prompt.to_string() }] }] };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::ApiRequest(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| AiError::ApiRequest(e.to_string()))?;

        if status != 200 {
            return Err(AiError::ApiResponse { status, body: text });
        }

        parse_response(&text)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Serialize)]
struct ApiRequest {
    contents: Vec<Content>,
}

#[derive(serde::Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(serde::Serialize)]
struct Part {
    text: String,
}

#[derive(serde::Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(serde::Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(serde::Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(serde::Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_response(json: &str) -> Result<String, AiError> {
    let api: ApiResponse = serde_json::from_str(json).map_err(|e| AiError::ApiParse(e.to_string()))?;

    let text: String = api
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| content.parts.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join(""))
        .unwrap_or_default();

    if text.is_empty() {
        return Err(AiError::ApiParse("no candidate text in response".into()));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_requires_api_key() {
        assert!(matches!(
            GeminiClient::new(String::new(), "gemini-2.0-flash-exp".into()),
            Err(AiError::MissingApiKey)
        ));
    }

    #[test]
    fn new_with_key_succeeds() {
        let client = GeminiClient::new("key".into(), "gemini-2.0-flash-exp".into()).unwrap();
        assert_eq!(client.model(), "gemini-2.0-flash-exp");
    }

    #[test]
    fn parse_response_extracts_text() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"hello "},{"text":"world"}]}}]}"#;
        assert_eq!(parse_response(json).unwrap(), "hello world");
    }

    #[test]
    fn parse_response_empty_candidates_is_error() {
        let json = r#"{"candidates":[]}"#;
        assert!(matches!(parse_response(json), Err(AiError::ApiParse(_))));
    }

    #[test]
    fn parse_response_missing_content_is_error() {
        let json = r#"{"candidates":[{}]}"#;
        assert!(matches!(parse_response(json), Err(AiError::ApiParse(_))));
    }

    #[test]
    fn parse_response_invalid_json_is_error() {
        assert!(matches!(parse_response("not json"), Err(AiError::ApiParse(_))));
    }

    #[test]
    fn request_wire_shape() {
        let body = ApiRequest { contents: vec![Content { parts: vec![Part { text: "hi".into() }] }] };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
    }
}
