//! Main orchestrator - drives one conversational turn
//!
//! SEARCHING → SOURCES READY → GENERATING → FOLLOWUPS READY → COMPLETE
//!
//! Any failure before the answer has finished streaming ends the turn with a
//! single `error` event. Follow-up generation failures are logged and dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant as Deadline;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, TurnConfig};
use crate::error::OrchestrationError;
use crate::events::{ErrorData, EventWriter, FollowupData, Frame, StreamEvent, TickerData};
use crate::guidance::{self, FailureKind};
use crate::llm::{ChatMessage, GroqClient, LanguageModel, ScriptedModel};
use crate::models::{SearchResults, TurnRequest};
use crate::search::{self, FirecrawlClient, ScriptedSearch, SearchProvider};
use crate::ticker::{self, Ticker};
use crate::Result;

pub mod prompt;

/// Frames buffered between the turn task and its consumer
const CHANNEL_CAPACITY: usize = 64;

/// Turn state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Searching,
    SourcesReady,
    Generating,
    FollowupsReady,
    Complete,
    Error,
}

/// Summary of a finished turn. The client sees the same data as frames.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn_id: Uuid,
    pub transitions: Vec<TurnState>,
    pub results: SearchResults,
    pub ticker: Option<Ticker>,
    pub answer: String,
    pub followups: Option<Vec<String>>,
    pub failure: Option<FailureKind>,
    pub reasoning_trace: Vec<String>,
    pub execution_time_ms: u64,
}

impl TurnOutcome {
    fn new(turn_id: Uuid) -> Self {
        Self {
            turn_id,
            transitions: Vec::new(),
            results: SearchResults::default(),
            ticker: None,
            answer: String::new(),
            followups: None,
            failure: None,
            reasoning_trace: Vec::new(),
            execution_time_ms: 0,
        }
    }

    pub fn final_state(&self) -> Option<TurnState> {
        self.transitions.last().copied()
    }

    fn enter(&mut self, state: TurnState) {
        debug!(turn_id = %self.turn_id, state = ?state, "Turn transition");
        self.transitions.push(state);
    }
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Main orchestrator that coordinates search, generation and follow-ups
pub struct Orchestrator {
    search: Arc<dyn SearchProvider>,
    llm: Arc<dyn LanguageModel>,
    config: TurnConfig,
}

impl Orchestrator {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        llm: Arc<dyn LanguageModel>,
        config: TurnConfig,
    ) -> Self {
        Self {
            search,
            llm,
            config,
        }
    }

    /// Wire the Firecrawl and Groq clients from configuration.
    ///
    /// A missing key does not stop startup; every turn then fails with the
    /// invalid-key guidance instead.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let search: Arc<dyn SearchProvider> = match &config.firecrawl_api_key {
            Some(key) => Arc::new(FirecrawlClient::new(
                key.clone(),
                config.firecrawl_base_url.clone(),
            )?),
            None => {
                warn!("FIRECRAWL_API_KEY not set; searches will be rejected");
                Arc::new(ScriptedSearch::failing(
                    Some(401),
                    "FIRECRAWL_API_KEY is not configured",
                ))
            }
        };

        let llm: Arc<dyn LanguageModel> = match &config.groq_api_key {
            Some(key) => {
                let client = GroqClient::new(
                    key.clone(),
                    config.groq_base_url.clone(),
                    config.llm_model.clone(),
                )?;
                info!(model = client.model(), "LLM client ready");
                Arc::new(client)
            }
            None => {
                warn!("GROQ_API_KEY not set; generation will be rejected");
                Arc::new(
                    ScriptedModel::new(std::iter::empty::<String>())
                        .failing_stream(Some(401), "GROQ_API_KEY is not configured"),
                )
            }
        };

        Ok(Self::new(search, llm, config.turn.clone()))
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    /// Run a turn on its own task and hand back the frame receiver.
    ///
    /// Dropping the receiver, or firing `cancel`, stops the turn.
    pub fn spawn_turn(
        self: &Arc<Self>,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> (Uuid, mpsc::Receiver<Frame>) {
        let turn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let orchestrator = Arc::clone(self);

        tokio::spawn(async move {
            let mut writer = EventWriter::new(tx, turn_id).with_cancellation(cancel.clone());
            match orchestrator.run_turn(request, &mut writer, &cancel).await {
                Ok(outcome) => info!(
                    turn_id = %turn_id,
                    state = ?outcome.final_state(),
                    elapsed_ms = outcome.execution_time_ms,
                    "Turn finished"
                ),
                Err(OrchestrationError::Cancelled) => {
                    info!(turn_id = %turn_id, "Turn cancelled by client")
                }
                Err(e) => warn!(turn_id = %turn_id, error = %e, "Turn aborted"),
            }
        });

        (turn_id, rx)
    }

    /// Run one turn, writing every frame through `writer`.
    ///
    /// Upstream failures become an `error` event and an `Ok` outcome in the
    /// `Error` state. `Err(Cancelled)` means the client went away; nothing is
    /// written after that point.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        writer: &mut EventWriter,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let start_time = Instant::now();
        let mut outcome = TurnOutcome::new(writer.turn());

        info!(
            turn_id = %outcome.turn_id,
            query_len = request.query.len(),
            history = request.history.len(),
            "Orchestrator: starting turn"
        );
        debug!(turn_id = %outcome.turn_id, query = %request.query, "Turn query");

        writer.start().await?;

        // === SEARCH ===
        outcome.enter(TurnState::Searching);
        writer.event(StreamEvent::status("Starting search...")).await?;
        writer
            .event(StreamEvent::status("Searching for relevant sources..."))
            .await?;

        let deadline = Deadline::now() + self.config.search_timeout;
        let searched = bounded(
            cancel,
            deadline,
            "search",
            self.search.search(&request.query, self.config.search_limit),
        )
        .await;

        let results = match searched {
            Ok(raw) => search::normalize(raw),
            Err(OrchestrationError::Cancelled) => return Err(OrchestrationError::Cancelled),
            Err(e) => return self.fail(writer, outcome, e, start_time).await,
        };

        outcome.reasoning_trace.push(format!(
            "SEARCH: {} sources, {} news, {} images",
            results.sources.len(),
            results.news_results.len(),
            results.image_results.len()
        ));
        info!(
            turn_id = %outcome.turn_id,
            source_count = results.sources.len(),
            news_count = results.news_results.len(),
            image_count = results.image_results.len(),
            "Search complete"
        );

        writer.event(StreamEvent::Sources(results.clone())).await?;
        outcome.enter(TurnState::SourcesReady);

        writer
            .event(StreamEvent::status("Analyzing sources and generating answer..."))
            .await?;

        // === CLASSIFY ===
        outcome.ticker = ticker::detect(&request.query);
        if let Some(symbol) = &outcome.ticker {
            outcome.reasoning_trace.push(format!("TICKER: {}", symbol));
            writer
                .event(StreamEvent::Ticker(TickerData {
                    symbol: symbol.clone(),
                }))
                .await?;
        }

        // === PROMPT ===
        let context =
            prompt::build_context(&results.sources, &request.query, self.config.excerpt_max_chars);
        let messages = prompt::answer_messages(&request, &context);
        let titles: Vec<String> = results.sources.iter().map(|s| s.title.clone()).collect();
        outcome.results = results;

        let followup_task = if self.config.parallel_followups {
            Some(self.spawn_followups(prompt::followup_messages(&request, None, &titles)))
        } else {
            None
        };

        // === GENERATE ===
        outcome.enter(TurnState::Generating);
        match self.stream_answer(messages, writer, cancel).await {
            Ok(answer) => outcome.answer = answer,
            Err(OrchestrationError::Cancelled) => return Err(OrchestrationError::Cancelled),
            Err(e) => return self.fail(writer, outcome, e, start_time).await,
        }
        outcome
            .reasoning_trace
            .push(format!("GENERATE: {} chars streamed", outcome.answer.len()));

        // === FOLLOW-UPS ===
        // The event is only written here, after the answer stream has flushed.
        let deadline = Deadline::now() + self.config.followup_timeout;
        let generated = match followup_task {
            Some(mut task) => {
                bounded(cancel, deadline, "followups", async {
                    (&mut task.0).await.unwrap_or_else(|e| {
                        Err(OrchestrationError::Generation {
                            status: None,
                            message: format!("follow-up task failed: {}", e),
                        })
                    })
                })
                .await
            }
            None => {
                let messages =
                    prompt::followup_messages(&request, Some(&outcome.answer), &titles);
                bounded(cancel, deadline, "followups", self.llm.complete(messages)).await
            }
        };

        match generated {
            Ok(text) => {
                let questions = prompt::parse_followups(&text);
                outcome
                    .reasoning_trace
                    .push(format!("FOLLOWUPS: {} questions", questions.len()));
                writer
                    .event(StreamEvent::Followup(FollowupData {
                        questions: questions.clone(),
                    }))
                    .await?;
                outcome.followups = Some(questions);
                outcome.enter(TurnState::FollowupsReady);
            }
            Err(OrchestrationError::Cancelled) => return Err(OrchestrationError::Cancelled),
            Err(e) => {
                warn!(turn_id = %outcome.turn_id, error = %e, "Follow-up generation failed");
                outcome
                    .reasoning_trace
                    .push("FOLLOWUPS: skipped after failure".to_string());
            }
        }

        // === COMPLETE ===
        writer.finish().await?;
        outcome.enter(TurnState::Complete);
        outcome.execution_time_ms = start_time.elapsed().as_millis() as u64;

        info!(
            turn_id = %outcome.turn_id,
            answer_len = outcome.answer.len(),
            ticker = ?outcome.ticker.as_ref().map(Ticker::as_str),
            "Turn complete"
        );

        Ok(outcome)
    }

    fn spawn_followups(&self, messages: Vec<ChatMessage>) -> AbortOnDrop<Result<String>> {
        let llm = Arc::clone(&self.llm);
        AbortOnDrop(tokio::spawn(async move { llm.complete(messages).await }))
    }

    /// Forward answer deltas as text frames; returns the full answer.
    async fn stream_answer(
        &self,
        messages: Vec<ChatMessage>,
        writer: &mut EventWriter,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let deadline = Deadline::now() + self.config.generation_timeout;
        let mut stream = bounded(cancel, deadline, "generation", self.llm.stream_chat(messages)).await?;

        let mut answer = String::new();
        while let Some(delta) = bounded(cancel, deadline, "generation", async {
            Ok(stream.next().await)
        })
        .await?
        {
            let delta = delta?;
            if delta.is_empty() {
                continue;
            }
            answer.push_str(&delta);
            writer.text(delta).await?;
        }

        Ok(answer)
    }

    /// Emit the single error event for a failed turn.
    async fn fail(
        &self,
        writer: &mut EventWriter,
        mut outcome: TurnOutcome,
        err: OrchestrationError,
        start_time: Instant,
    ) -> Result<TurnOutcome> {
        let kind = err.failure_kind();
        warn!(
            turn_id = %outcome.turn_id,
            kind = ?kind,
            status = ?err.status_code(),
            error = %err,
            "Turn failed"
        );

        writer.event(StreamEvent::Error(error_data(&err))).await?;

        outcome.enter(TurnState::Error);
        outcome.failure = Some(kind);
        outcome.reasoning_trace.push(format!("ERROR: {}", err));
        outcome.execution_time_ms = start_time.elapsed().as_millis() as u64;
        Ok(outcome)
    }
}

/// Payload of the `error` event: guidance for known failure codes, otherwise
/// the raw message.
pub fn error_data(err: &OrchestrationError) -> ErrorData {
    let status_code = err.status_code();
    match status_code.and_then(guidance::lookup) {
        Some(g) => ErrorData {
            error: g.title.to_string(),
            suggestion: Some(g.message.to_string()),
            status_code,
        },
        None => ErrorData {
            error: err.to_string(),
            suggestion: None,
            status_code,
        },
    }
}

/// Race a provider call against the turn deadline and client cancellation.
async fn bounded<T, F>(
    cancel: &CancellationToken,
    deadline: Deadline,
    stage: &'static str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(OrchestrationError::Cancelled),
        res = tokio::time::timeout_at(deadline, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(OrchestrationError::Timeout(stage)),
        },
    }
}
