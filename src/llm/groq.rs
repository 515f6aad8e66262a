//! OpenAI-compatible chat completions client (Groq by default)
//!
//! Streaming responses arrive as server-sent events: `data: {json}` lines with
//! a `choices[0].delta.content` fragment each, terminated by `data: [DONE]`.

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{ChatMessage, LanguageModel, TextStream};
use crate::error::OrchestrationError;
use crate::Result;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "moonshotai/kimi-k2-instruct";

const TEMPERATURE: f32 = 0.7;

/// Reusable chat client (connection-pooled)
pub struct GroqClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GroqClient {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::Config(
                "GROQ_API_KEY not configured".to_string(),
            ));
        }

        let request = CompletionRequest {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
            stream,
        };

        info!(model = %self.model, stream, messages = messages.len(), "Calling chat completions");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Chat completion request failed: {}", e);
                OrchestrationError::Generation {
                    status: e.status().map(|s| s.as_u16()),
                    message: format!("LLM API error: {}", e),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            error!(status = status.as_u16(), "Chat completion error response: {}", detail);
            return Err(OrchestrationError::Generation {
                status: Some(status.as_u16()),
                message: format!("LLM API error: {}", detail),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for GroqClient {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TextStream> {
        let response = self.post(&messages, true).await?;
        Ok(sse_deltas(response.bytes_stream()))
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let response = self.post(&messages, false).await?;
        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            error!("Failed to parse chat completion: {}", e);
            OrchestrationError::Generation {
                status: None,
                message: format!("LLM parse error: {}", e),
            }
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        debug!(chars = text.len(), "Chat completion received");
        Ok(text)
    }
}

// ===== Server-Sent Events =====

#[derive(Debug, PartialEq)]
enum SseLine {
    Delta(String),
    Done,
    Failed(String),
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(payload) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                return SseLine::Failed(err.message);
            }
            chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .filter(|c| !c.is_empty())
                .map(SseLine::Delta)
                .unwrap_or(SseLine::Skip)
        }
        Err(_) => SseLine::Skip,
    }
}

struct SseState<S> {
    inner: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String>>,
    done: bool,
}

impl<S> SseState<S> {
    /// Move every complete line out of the buffer
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.push_line(&String::from_utf8_lossy(&line));
            if self.done {
                return;
            }
        }
    }

    fn push_line(&mut self, line: &str) {
        match parse_sse_line(line.trim()) {
            SseLine::Delta(text) => self.pending.push_back(Ok(text)),
            SseLine::Done => self.done = true,
            SseLine::Failed(message) => {
                self.pending.push_back(Err(OrchestrationError::Generation {
                    status: None,
                    message,
                }));
                self.done = true;
            }
            SseLine::Skip => {}
        }
    }
}

/// Turn a raw SSE byte stream into answer deltas.
fn sse_deltas<S, B, E>(inner: S) -> TextStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    let state = SseState {
        inner: Box::pin(inner),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.done {
                return None;
            }

            match st.inner.next().await {
                Some(Ok(bytes)) => {
                    st.buffer.extend_from_slice(bytes.as_ref());
                    st.drain_lines();
                }
                Some(Err(e)) => {
                    st.done = true;
                    st.pending.push_back(Err(OrchestrationError::Generation {
                        status: None,
                        message: format!("LLM stream error: {}", e),
                    }));
                }
                None => {
                    let rest = std::mem::take(&mut st.buffer);
                    st.push_line(&String::from_utf8_lossy(&rest));
                    st.done = true;
                }
            }
        }
    })
    .boxed()
}

// ===== Wire Types =====

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}
