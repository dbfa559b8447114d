use crate::ai::{ChatModel, GenerateError, ModelReply, TokenUsage};
use crate::models::HistoryEntry;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Finish reasons that mean the candidate was withheld by content filters
const BLOCKED_FINISH_REASONS: [&str; 4] = ["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

/// Client for the Gemini `generateContent` endpoint.
/// The API key is supplied per call so one client serves every credential.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
    status: Option<String>,
}

impl GeminiClient {
    pub fn new(timeout: Duration) -> Result<Self, String> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, String> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn send_message(
        &self,
        api_key: &str,
        model: &str,
        history: &[HistoryEntry],
        prompt: &str,
    ) -> Result<ModelReply, GenerateError> {
        let request = build_request(history, prompt);
        let endpoint = self.endpoint(model);

        log::info!(
            "[GEMINI] Sending request to model {} with {} history entries",
            model,
            history.len()
        );

        let response = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerateError::Timeout(self.timeout)
                } else {
                    GenerateError::Other(format!("Gemini API request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerateError::Other(format!("Failed to read Gemini response: {}", e)))?;

        if !status.is_success() {
            return Err(classify_error_body(status.as_u16(), &body));
        }

        log::debug!("[GEMINI] Raw response:\n{}", body);
        parse_response(&body)
    }
}

fn build_request(history: &[HistoryEntry], prompt: &str) -> GenerateContentRequest {
    let mut contents: Vec<GeminiContent> = history
        .iter()
        .map(|entry| GeminiContent {
            role: entry.role.as_str().to_string(),
            parts: entry
                .parts
                .iter()
                .map(|part| GeminiPart {
                    text: Some(part.clone()),
                })
                .collect(),
        })
        .collect();

    contents.push(GeminiContent {
        role: "user".to_string(),
        parts: vec![GeminiPart {
            text: Some(prompt.to_string()),
        }],
    });

    GenerateContentRequest { contents }
}

fn classify_error_body(http_status: u16, body: &str) -> GenerateError {
    match serde_json::from_str::<GeminiErrorResponse>(body) {
        Ok(error_response) => GenerateError::from_api_error(
            http_status,
            error_response.error.status.as_deref(),
            &error_response.error.message,
        ),
        Err(_) => GenerateError::from_api_error(http_status, None, body),
    }
}

fn parse_response(body: &str) -> Result<ModelReply, GenerateError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| GenerateError::Other(format!("Failed to parse Gemini response: {}", e)))?;

    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_ref())
    {
        return Err(GenerateError::SafetyBlocked(format!("prompt blocked ({})", reason)));
    }

    let candidate = response
        .candidates
        .first()
        .ok_or_else(|| GenerateError::EmptyResponse("no candidates returned".to_string()))?;

    let finish_reason = candidate.finish_reason.as_deref().unwrap_or("");
    if BLOCKED_FINISH_REASONS.contains(&finish_reason) {
        return Err(GenerateError::SafetyBlocked(format!(
            "candidate stopped ({})",
            finish_reason
        )));
    }

    let text: String = candidate
        .content
        .as_ref()
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        return Err(GenerateError::EmptyResponse(format!(
            "candidate has no text (finish reason: {})",
            if finish_reason.is_empty() { "unknown" } else { finish_reason }
        )));
    }

    let usage = response.usage_metadata.map(|usage| TokenUsage {
        prompt_tokens: usage.prompt_token_count,
        candidate_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count,
    });

    Ok(ModelReply { text, usage })
}
