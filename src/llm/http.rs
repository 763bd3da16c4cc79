//! OpenAI-compatible chat-completions client over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Completion, LlmClient, LlmError, TokenReceiver};
use crate::config::LlmConfig;

/// Buffered tokens between the provider stream and the consumer.
const STREAM_CHANNEL_CAPACITY: usize = 32;

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(serde::Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(serde::Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
}

#[derive(serde::Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(serde::Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(serde::Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP-backed [`LlmClient`].
pub struct HttpLlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
    idle_timeout_secs: u64,
}

impl HttpLlmClient {
    /// Builds a client from configuration. No default request timeout is
    /// installed on the reqwest client; completions set a per-request
    /// deadline and streams rely on the idle timeout instead.
    pub fn new(config: &LlmConfig, api_key: &str) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::NotConfigured(
                "an API key is required for the LLM provider; set MEEPLE_API_KEY".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        })
    }

    fn request(&self, system: &str, user: &str, stream: bool) -> reqwest::RequestBuilder {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            stream,
        };

        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
    }

    fn classify(e: reqwest::Error) -> LlmError {
        if let Some(status) = e.status() {
            LlmError::Api {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            LlmError::Transport(e.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(LlmError::Api {
            status: status.as_u16(),
            message: body,
        })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError> {
        let response = self
            .request(system, user, false)
            .timeout(Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(Self::classify)?;

        let response = Self::check_status(response).await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        let usage = body.usage.unwrap_or_default();

        Ok(Completion {
            text: choice.message.content,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        })
    }

    async fn stream(&self, system: &str, user: &str) -> Result<TokenReceiver, LlmError> {
        let response = self
            .request(system, user, true)
            .send()
            .await
            .map_err(Self::classify)?;

        let response = Self::check_status(response).await?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let idle = Duration::from_secs(self.idle_timeout_secs);
        let idle_secs = self.idle_timeout_secs;

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            loop {
                let chunk = match tokio::time::timeout(idle, byte_stream.next()).await {
                    Ok(Some(Ok(bytes))) => bytes,
                    Ok(Some(Err(e))) => {
                        let _ = tx.send(Err(LlmError::Transport(e.to_string()))).await;
                        return;
                    }
                    Ok(None) => {
                        debug!("provider stream ended without [DONE]");
                        return;
                    }
                    Err(_) => {
                        let _ = tx
                            .send(Err(LlmError::IdleTimeout { secs: idle_secs }))
                            .await;
                        return;
                    }
                };

                let Ok(text) = std::str::from_utf8(&chunk) else {
                    warn!("non-utf8 chunk in provider stream, skipping");
                    continue;
                };
                buffer.push_str(text);

                // Complete SSE events are separated by a blank line.
                while let Some(event_end) = buffer.find("\n\n") {
                    let event = buffer[..event_end].to_string();
                    buffer.drain(..event_end + 2);

                    for line in event.lines() {
                        let Some(data) = line.strip_prefix("data: ") else {
                            continue;
                        };

                        if data.trim() == "[DONE]" {
                            return;
                        }

                        match serde_json::from_str::<StreamChunk>(data) {
                            Ok(chunk) => {
                                for choice in chunk.choices {
                                    if let Some(content) = choice.delta.content
                                        && !content.is_empty()
                                        && tx.send(Ok(content)).await.is_err()
                                    {
                                        // Receiver dropped: consumer is gone.
                                        debug!("token receiver dropped, stopping stream");
                                        return;
                                    }
                                    if choice.finish_reason.is_some() {
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!("failed to parse stream chunk: {e}");
                            }
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
