use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::core::config::Settings;

#[derive(Debug, Error)]
pub(crate) enum LlmError {
    #[error("LLM API key is not configured")]
    MissingApiKey,
    #[error("LLM request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("LLM API error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("LLM stream error: {0}")]
    Stream(String),
}

#[derive(Debug, Clone)]
pub(crate) struct CompletionRequest {
    pub(crate) system: String,
    pub(crate) user: String,
    /// Log label, usually the document filename.
    pub(crate) label: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct Usage {
    #[serde(default)]
    pub(crate) input_tokens: u64,
    #[serde(default)]
    pub(crate) output_tokens: u64,
    #[serde(default)]
    pub(crate) cache_creation_input_tokens: u64,
    #[serde(default)]
    pub(crate) cache_read_input_tokens: u64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Completion {
    pub(crate) text: String,
    pub(crate) usage: Usage,
}

/// Text completion seam used by the parsing run.
#[async_trait]
pub(crate) trait CompletionClient: Send + Sync {
    /// `streamed_chars` is advanced as reply text arrives, for heartbeat reporting.
    async fn complete(
        &self,
        request: &CompletionRequest,
        streamed_chars: &AtomicUsize,
    ) -> Result<Completion, LlmError>;
}

#[derive(Debug, Clone)]
pub(crate) struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    api_version: String,
    model: String,
    max_tokens: u32,
    stream: bool,
}

impl AnthropicClient {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let llm = settings.llm();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(llm.request_timeout))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key: llm.api_key.clone(),
            base_url: llm.base_url.trim_end_matches('/').to_string(),
            api_version: llm.api_version.clone(),
            model: llm.model.clone(),
            max_tokens: llm.max_tokens,
            stream: llm.stream,
        })
    }

    fn payload(&self, request: &CompletionRequest) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "stream": self.stream,
            "system": [
                {
                    "type": "text",
                    "text": request.system,
                    "cache_control": {"type": "ephemeral"}
                }
            ],
            "messages": [
                {"role": "user", "content": request.user}
            ]
        })
    }

    async fn send(&self, request: &CompletionRequest) -> Result<reqwest::Response, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&self.payload(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        Ok(response)
    }

    async fn complete_blocking(
        &self,
        request: &CompletionRequest,
        streamed_chars: &AtomicUsize,
    ) -> Result<Completion, LlmError> {
        let body: Value = self.send(request).await?.json().await?;

        let text = body
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                    .filter_map(|block| block.get("text").and_then(Value::as_str))
                    .collect::<String>()
            })
            .unwrap_or_default();
        let usage = body
            .get("usage")
            .cloned()
            .and_then(|usage| serde_json::from_value(usage).ok())
            .unwrap_or_default();

        streamed_chars.store(text.chars().count(), Ordering::Relaxed);
        Ok(Completion { text, usage })
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        streamed_chars: &AtomicUsize,
    ) -> Result<Completion, LlmError> {
        let mut stream = self.send(request).await?.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut state = StreamState::default();

        while let Some(chunk) = stream.next().await {
            decoder.push(&chunk?);
            while let Some(event) = decoder.next_event() {
                state.apply(&event)?;
                streamed_chars.store(state.chars, Ordering::Relaxed);
            }
        }

        Ok(Completion { text: state.text, usage: state.usage })
    }
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
        streamed_chars: &AtomicUsize,
    ) -> Result<Completion, LlmError> {
        let timer = Instant::now();
        tracing::info!(label = %request.label, model = %self.model, stream = self.stream, "Sending LLM request");

        let completion = if self.stream {
            self.complete_streaming(request, streamed_chars).await?
        } else {
            self.complete_blocking(request, streamed_chars).await?
        };

        tracing::info!(
            label = %request.label,
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            cache_creation_input_tokens = completion.usage.cache_creation_input_tokens,
            cache_read_input_tokens = completion.usage.cache_read_input_tokens,
            reply_chars = completion.text.chars().count(),
            elapsed_seconds = timer.elapsed().as_secs_f64(),
            "LLM request completed"
        );

        Ok(completion)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub(crate) event: String,
    pub(crate) data: String,
}

/// Incremental `text/event-stream` framing over raw body chunks.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes.iter().copied().filter(|byte| *byte != b'\r'));
    }

    pub(crate) fn next_event(&mut self) -> Option<SseEvent> {
        loop {
            let end = self.buffer.windows(2).position(|pair| pair == b"\n\n")?;
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let block = String::from_utf8_lossy(&block[..end]);

            let mut event = String::from("message");
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    event = value.trim().to_string();
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push(value.strip_prefix(' ').unwrap_or(value).to_string());
                }
            }

            if !data.is_empty() {
                return Some(SseEvent { event, data: data.join("\n") });
            }
        }
    }
}

#[derive(Debug, Default)]
struct StreamState {
    text: String,
    chars: usize,
    usage: Usage,
}

impl StreamState {
    fn apply(&mut self, event: &SseEvent) -> Result<(), LlmError> {
        let Ok(payload) = serde_json::from_str::<Value>(&event.data) else {
            return Ok(());
        };

        match payload.get("type").and_then(Value::as_str).unwrap_or(event.event.as_str()) {
            "message_start" => {
                if let Some(usage) = payload.pointer("/message/usage").cloned() {
                    self.usage = serde_json::from_value(usage).unwrap_or_default();
                }
            }
            "content_block_delta" => {
                if let Some(text) = payload.pointer("/delta/text").and_then(Value::as_str) {
                    self.chars += text.chars().count();
                    self.text.push_str(text);
                }
            }
            "message_delta" => {
                if let Some(output) =
                    payload.pointer("/usage/output_tokens").and_then(Value::as_u64)
                {
                    self.usage.output_tokens = output;
                }
            }
            "error" => {
                let message = payload
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown stream error");
                return Err(LlmError::Stream(message.to_string()));
            }
            _ => {}
        }

        Ok(())
    }
}
