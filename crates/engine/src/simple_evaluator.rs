use serde::{Deserialize, Serialize};
use thiserror::Error;

const SYSTEM_PROMPT: &str = "You are a triage assistant. Given an issue title and description, decide whether it is \
concrete and actionable enough for an automated coding agent to attempt, or whether it needs more detail from a \
human first. Respond with should_evaluate, a short reason, and zero or more categories.";

#[derive(Debug, Clone, Serialize)]
pub struct SimpleEvaluationInput<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleEvaluationResult {
    pub should_evaluate: bool,
    pub reason: String,
    #[serde(default)]
    pub categories: Vec<String>,
    pub usage: TokenUsage,
}

#[derive(Debug, Error)]
pub enum SimpleEvaluatorError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// A single fixed-prompt LLM call producing a structured ready/needs-more
/// verdict. Malformed JSON from the provider is tolerated:
/// the evaluator returns a `needs_clarification`-equivalent verdict rather
/// than propagating a parse error.
pub struct SimpleEvaluator {
    client: reqwest::Client,
}

impl Default for SimpleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleEvaluator {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub async fn evaluate(
        &self,
        input: SimpleEvaluationInput<'_>,
        provider_config: &serde_json::Value,
    ) -> Result<SimpleEvaluationResult, SimpleEvaluatorError> {
        let api_key = provider_config.get("api_key").and_then(|v| v.as_str()).unwrap_or_default();
        let model = provider_config
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("claude-3-5-haiku-latest");

        let body = serde_json::json!({
            "model": model,
            "max_tokens": 512,
            "system": SYSTEM_PROMPT,
            "messages": [{
                "role": "user",
                "content": format!(
                    "Title: {}\nDescription: {}",
                    input.title,
                    input.description.unwrap_or("(none provided)"),
                ),
            }],
        });

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => return Err(SimpleEvaluatorError::Http(e)),
        };

        let raw: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(_) => return Ok(Self::fallback_result()),
        };

        Self::parse_response(&raw)
    }

    fn parse_response(raw: &serde_json::Value) -> Result<SimpleEvaluationResult, SimpleEvaluatorError> {
        let text = raw
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|block| block.get("text"))
            .and_then(|t| t.as_str());

        let parsed: Option<serde_json::Value> = text.and_then(|t| serde_json::from_str(t).ok());

        let usage = TokenUsage {
            input_tokens: raw.get("usage").and_then(|u| u.get("input_tokens")).and_then(|v| v.as_u64()).unwrap_or(0),
            output_tokens: raw.get("usage").and_then(|u| u.get("output_tokens")).and_then(|v| v.as_u64()).unwrap_or(0),
        };

        let Some(parsed) = parsed else {
            return Ok(Self::fallback_result_with_usage(usage));
        };

        let should_evaluate = parsed.get("should_evaluate").and_then(|v| v.as_bool()).unwrap_or(false);
        let reason = parsed
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("model response did not include a reason")
            .to_string();
        let categories = parsed
            .get("categories")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        Ok(SimpleEvaluationResult {
            should_evaluate,
            reason,
            categories,
            usage,
        })
    }

    fn fallback_result() -> SimpleEvaluationResult {
        Self::fallback_result_with_usage(TokenUsage {
            input_tokens: 0,
            output_tokens: 0,
        })
    }

    fn fallback_result_with_usage(usage: TokenUsage) -> SimpleEvaluationResult {
        SimpleEvaluationResult {
            should_evaluate: false,
            reason: "model response was not valid JSON; treating as needs_clarification".into(),
            categories: Vec::new(),
            usage,
        }
    }
}
