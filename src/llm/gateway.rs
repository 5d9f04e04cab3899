//! OpenAI-compatible chat-completions client for the LLM gateway.
//!
//! Transient failures (network, 408/429/5xx) retry with exponential backoff
//! plus jitter, capped at 60 seconds per wait. Anything else surfaces
//! immediately and the runtime treats it as a turn failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;

use super::{estimate_tokens, ChatMessage, Completion, LlmClient, Role, TokenUsage};
use crate::config::AppConfig;
use crate::error::{ConfigError, LlmError};

/// Per-response completion cap sent to the gateway.
const MAX_COMPLETION_TOKENS: u32 = 4096;
/// Upper bound on a single backoff wait.
const MAX_BACKOFF_SECS: f64 = 60.0;

pub struct GatewayClient {
    http: reqwest::Client,
    model: String,
    api_base: String,
    api_key: Option<String>,
    max_retries: u32,
    usage: Arc<TokenUsage>,
}

impl GatewayClient {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let api_base = config
            .api_base
            .as_deref()
            .ok_or_else(|| ConfigError::Missing("LITE_LLM_API_BASE".to_string()))?
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            http: reqwest::Client::new(),
            model: config.model.clone(),
            api_base,
            api_key: config.api_key.clone(),
            max_retries: config.llm_max_retries,
            usage: TokenUsage::new(),
        })
    }

    pub fn usage(&self) -> Arc<TokenUsage> {
        self.usage.clone()
    }

    fn request_body(&self, messages: &[ChatMessage], temperature: f32) -> serde_json::Value {
        let rendered: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({"role": role, "content": m.content})
            })
            .collect();
        json!({
            "model": self.model,
            "messages": rendered,
            "temperature": temperature,
            "max_tokens": MAX_COMPLETION_TOKENS,
        })
    }

    async fn send_once(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<Completion, LlmError> {
        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .json(&self.request_body(messages, temperature));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::Server {
                status: status.as_u16(),
                message: body.chars().take(500).collect(),
            });
        }

        let fallback_in: u64 = messages.iter().map(|m| estimate_tokens(&m.content)).sum();
        parse_completion(&body, fallback_in)
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

/// Parse a chat-completions response body, falling back to character-based
/// token estimates when the gateway omits usage.
fn parse_completion(body: &str, fallback_in: u64) -> Result<Completion, LlmError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::InvalidResponse(format!("bad completion JSON: {e}")))?;

    let text = response
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .ok_or_else(|| LlmError::InvalidResponse("response has no text content".to_string()))?;

    let (tokens_in, tokens_out) = match response.usage {
        Some(usage) => (
            usage.prompt_tokens.unwrap_or(fallback_in),
            usage.completion_tokens.unwrap_or_else(|| estimate_tokens(&text)),
        ),
        None => (fallback_in, estimate_tokens(&text)),
    };

    Ok(Completion {
        text,
        tokens_in,
        tokens_out,
    })
}

/// Exponential backoff with up to 10% jitter, capped.
fn backoff_delay(attempt: u32) -> Duration {
    let base = 2f64.powi(attempt as i32);
    let jitter = rand::thread_rng().gen_range(0.0..base * 0.1);
    Duration::from_secs_f64((base + jitter).min(MAX_BACKOFF_SECS))
}

#[async_trait]
impl LlmClient for GatewayClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<Completion, LlmError> {
        let mut last_error = String::new();

        for attempt in 0..self.max_retries {
            match self.send_once(messages, temperature).await {
                Ok(completion) => {
                    self.usage.add(completion.tokens_in, completion.tokens_out);
                    return Ok(completion);
                }
                Err(err) if err.is_transient() && attempt + 1 < self.max_retries => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = self.max_retries,
                        delay_secs = delay.as_secs_f64(),
                        "Transient LLM error, backing off: {err}"
                    );
                    last_error = err.to_string();
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_transient() => {
                    last_error = err.to_string();
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        Err(LlmError::Exhausted {
            attempts: self.max_retries,
            last_error,
        })
    }
}
