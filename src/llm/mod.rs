//! Language model trait and implementations
//!
//! The orchestrator needs two calls: a streamed chat completion for the answer
//! and a plain completion for follow-up questions.

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub mod groq;
pub use groq::GroqClient;

/// Answer deltas, in order. An `Err` item ends the stream.
pub type TextStream = BoxStream<'static, Result<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Trait for chat completion (LLM controlled)
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Start a streamed completion. Failures before the first delta are
    /// returned here; later failures arrive as an `Err` item.
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TextStream>;

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String>;
}

/// Scripted model for development & testing.
/// Replays fixed answer chunks and a fixed follow-up completion.
pub struct ScriptedModel {
    chunks: Vec<String>,
    chunk_delay: Option<Duration>,
    start_failure: Option<(Option<u16>, String)>,
    mid_stream_failure: Option<(usize, String)>,
    followups: std::result::Result<String, String>,
    followup_delay: Option<Duration>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    completions: AtomicUsize,
}

impl ScriptedModel {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            chunk_delay: None,
            start_failure: None,
            mid_stream_failure: None,
            followups: Ok(String::new()),
            followup_delay: None,
            requests: Mutex::new(Vec::new()),
            completions: AtomicUsize::new(0),
        }
    }

    pub fn with_followups(mut self, text: impl Into<String>) -> Self {
        self.followups = Ok(text.into());
        self
    }

    pub fn failing_followups(mut self, message: impl Into<String>) -> Self {
        self.followups = Err(message.into());
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn with_followup_delay(mut self, delay: Duration) -> Self {
        self.followup_delay = Some(delay);
        self
    }

    /// Reject the stream before any delta is produced
    pub fn failing_stream(mut self, status: Option<u16>, message: impl Into<String>) -> Self {
        self.start_failure = Some((status, message.into()));
        self
    }

    /// Produce `after` chunks, then fail
    pub fn failing_mid_stream(mut self, after: usize, message: impl Into<String>) -> Self {
        self.mid_stream_failure = Some((after, message.into()));
        self
    }

    /// Message lists received so far, streamed and completed alike
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    fn record(&self, messages: Vec<ChatMessage>) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages);
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TextStream> {
        self.record(messages);

        if let Some((status, message)) = &self.start_failure {
            return Err(OrchestrationError::Generation {
                status: *status,
                message: message.clone(),
            });
        }

        let mut items: Vec<Result<String>> = self.chunks.iter().cloned().map(Ok).collect();
        if let Some((after, message)) = &self.mid_stream_failure {
            items.truncate(*after);
            items.push(Err(OrchestrationError::Generation {
                status: None,
                message: message.clone(),
            }));
        }

        let delay = self.chunk_delay;
        let stream = stream::iter(items).then(move |item| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            item
        });

        Ok(stream.boxed())
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        self.record(messages);
        self.completions.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.followup_delay {
            tokio::time::sleep(delay).await;
        }

        self.followups
            .clone()
            .map_err(|message| OrchestrationError::Generation {
                status: None,
                message,
            })
    }
}
