//! Chat API client for Cohere v2 and OpenAI-compatible endpoints.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::HeaderMap};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::LlmError;
use crate::models::{LlmConfig, LlmProvider};

/// Sends one prompt and returns the model's text reply.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CohereResponse {
    message: CohereMessage,
}

#[derive(Debug, Deserialize)]
struct CohereMessage {
    #[serde(default)]
    content: Vec<CohereContent>,
}

#[derive(Debug, Deserialize)]
struct CohereContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP chat client.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: Client,
    provider: LlmProvider,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: Option<String>,
}

impl ChatClient {
    /// Create a client, reading the API key from the configured env var.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let key_env = config.api_key_env();
        let api_key = std::env::var(key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(key_env.to_string()))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            provider: config.provider,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
        })
    }

    fn endpoint(&self) -> String {
        match self.provider {
            LlmProvider::Cohere => format!("{}/v2/chat", self.base_url),
            LlmProvider::OpenAi => format!("{}/chat/completions", self.base_url),
        }
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn chat(&self, prompt: &str) -> Result<String, LlmError> {
        let url = self.endpoint();
        tracing::debug!(provider = %self.provider, model = %self.model, url = %url, "sending chat request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::ConnectionError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body, retry_after));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::ConnectionError(e.to_string())
            }
        })?;
        parse_reply(self.provider, &body)
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
fn classify_status(status: StatusCode, body: String, retry_after: Option<Duration>) -> LlmError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimited {
            message: body,
            retry_after,
        }
    } else if status == StatusCode::REQUEST_TIMEOUT {
        LlmError::Timeout
    } else if status.is_server_error() {
        LlmError::ServerError {
            status: status.as_u16(),
            body,
        }
    } else {
        LlmError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

/// `Retry-After` in whole seconds. HTTP dates are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn parse_reply(provider: LlmProvider, body: &str) -> Result<String, LlmError> {
    let text = match provider {
        LlmProvider::Cohere => {
            let reply: CohereResponse = serde_json::from_str(body)
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
            reply
                .message
                .content
                .into_iter()
                .filter_map(|c| c.text)
                .collect::<Vec<_>>()
                .join("")
        }
        LlmProvider::OpenAi => {
            let reply: OpenAiResponse = serde_json::from_str(body)
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
            reply
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default()
        }
    };

    if text.trim().is_empty() {
        return Err(LlmError::InvalidResponse("empty reply".to_string()));
    }
    Ok(text)
}
