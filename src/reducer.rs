//! Client Reducer
//!
//! Folds the frame stream into per-turn state. Exactly one turn is live; every
//! earlier turn is a frozen snapshot in the archive. The reducer is
//! synchronous and applies each frame at most once, using the frame's turn id
//! and sequence number.

use std::collections::{BTreeMap, VecDeque};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::events::{ErrorData, Frame, FrameBody, StreamEvent};
use crate::guidance::{self, ErrorGuidance};
use crate::models::{ImageItem, NewsItem, SearchResults, Source};
use crate::ticker::Ticker;

/// Turn ids remembered for rejecting replayed start frames
const RECENT_TURNS: usize = 32;

lazy_static! {
    static ref CITATION: Regex = Regex::new(r"\[(\d+)\]").expect("citation regex");
}

/// Frozen state of one completed turn
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnSnapshot {
    pub query: Option<String>,
    pub answer: String,
    pub sources: Vec<Source>,
    pub news: Vec<NewsItem>,
    pub images: Vec<ImageItem>,
    pub ticker: Option<Ticker>,
    pub follow_up_questions: Vec<String>,
}

impl TurnSnapshot {
    /// Sources cited in the answer as `[n]`, in first-citation order.
    /// Markers outside `1..=sources.len()` are ignored.
    pub fn citations(&self) -> Vec<(usize, &Source)> {
        let mut cited: Vec<usize> = Vec::new();
        for caps in CITATION.captures_iter(&self.answer) {
            if let Ok(n) = caps[1].parse::<usize>() {
                if n >= 1 && n <= self.sources.len() && !cited.contains(&n) {
                    cited.push(n);
                }
            }
        }

        cited.into_iter().map(|n| (n, &self.sources[n - 1])).collect()
    }
}

/// Mutable state of the live turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveTurn {
    pub turn_id: Option<Uuid>,
    pub status: Option<String>,
    pub snapshot: TurnSnapshot,
    pub error: Option<ErrorData>,
    pub finished: bool,
}

impl LiveTurn {
    /// Anything worth archiving arrived for this turn.
    pub fn has_data(&self) -> bool {
        let s = &self.snapshot;
        s.query.is_some()
            || !s.answer.is_empty()
            || !s.sources.is_empty()
            || !s.news.is_empty()
            || !s.images.is_empty()
            || s.ticker.is_some()
            || !s.follow_up_questions.is_empty()
    }

    /// Guidance for the live error, routed through the error classifier.
    pub fn error_guidance(&self) -> Option<&'static ErrorGuidance> {
        self.error
            .as_ref()
            .map(|e| guidance::classify_optional(e.status_code))
    }
}

/// How a frame was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Already applied; state unchanged
    Duplicate,
    /// Applied, but `missing` earlier frames never arrived
    AppliedAfterGap { missing: u64 },
    /// Belongs to a turn that is not live; state unchanged
    ForeignTurn,
}

#[derive(Debug, Default)]
pub struct ClientReducer {
    current_turn: Option<usize>,
    live: LiveTurn,
    archive: BTreeMap<usize, TurnSnapshot>,
    next_seq: u64,
    recent_turns: VecDeque<Uuid>,
}

impl ClientReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_turn(&self) -> Option<usize> {
        self.current_turn
    }

    pub fn live(&self) -> &LiveTurn {
        &self.live
    }

    pub fn archive(&self) -> &BTreeMap<usize, TurnSnapshot> {
        &self.archive
    }

    pub fn archived(&self, index: usize) -> Option<&TurnSnapshot> {
        self.archive.get(&index)
    }

    /// The user submitted a new query: freeze the live turn if it holds
    /// anything, then start an empty one.
    pub fn submit_query(&mut self, query: impl Into<String>) {
        self.advance();
        self.live.snapshot.query = Some(query.into());
    }

    pub fn apply(&mut self, frame: &Frame) -> ApplyOutcome {
        let is_live_turn = self.live.turn_id == Some(frame.turn);

        if !is_live_turn {
            // only a start frame may open a turn, and only once
            if frame.body != FrameBody::Start
                || frame.seq != 0
                || self.recent_turns.contains(&frame.turn)
            {
                return ApplyOutcome::ForeignTurn;
            }
            self.open_turn(frame.turn);
            return ApplyOutcome::Applied;
        }

        if frame.seq < self.next_seq {
            return ApplyOutcome::Duplicate;
        }
        let missing = frame.seq - self.next_seq;
        self.next_seq = frame.seq + 1;

        self.apply_body(&frame.body);

        if missing > 0 {
            ApplyOutcome::AppliedAfterGap { missing }
        } else {
            ApplyOutcome::Applied
        }
    }

    /// Snapshot of the live turn
    pub fn snapshot(&self) -> &TurnSnapshot {
        &self.live.snapshot
    }

    fn open_turn(&mut self, turn: Uuid) {
        // a start right after submit_query reuses the fresh turn
        let fresh = self.live.turn_id.is_none() && self.current_turn.is_some();
        if !fresh {
            self.advance();
        }
        if self.recent_turns.len() == RECENT_TURNS {
            self.recent_turns.pop_front();
        }
        self.recent_turns.push_back(turn);
        self.live.turn_id = Some(turn);
        self.next_seq = 1;
    }

    fn advance(&mut self) {
        if let Some(index) = self.current_turn {
            if self.live.has_data() {
                let frozen = std::mem::take(&mut self.live.snapshot);
                self.archive.entry(index).or_insert(frozen);
            }
        }
        self.live = LiveTurn::default();
        self.current_turn = Some(self.current_turn.map_or(0, |i| i + 1));
        self.next_seq = 0;
    }

    fn apply_body(&mut self, body: &FrameBody) {
        match body {
            FrameBody::Start => {}
            FrameBody::Text(delta) => self.live.snapshot.answer.push_str(delta),
            FrameBody::Finish => {
                self.live.finished = true;
                self.live.status = None;
            }
            FrameBody::Data { event, .. } => self.apply_event(event),
        }
    }

    fn apply_event(&mut self, event: &StreamEvent) {
        let snapshot = &mut self.live.snapshot;
        match event {
            StreamEvent::Status(data) => self.live.status = Some(data.message.clone()),
            StreamEvent::Sources(SearchResults {
                sources,
                news_results,
                image_results,
            }) => {
                snapshot.sources = sources.clone();
                snapshot.news = news_results.clone();
                snapshot.images = image_results.clone();
            }
            StreamEvent::Ticker(data) => snapshot.ticker = Some(data.symbol.clone()),
            StreamEvent::Followup(data) => {
                // an empty list never clears earlier questions
                if !data.questions.is_empty() {
                    snapshot.follow_up_questions = data.questions.clone();
                }
            }
            StreamEvent::Error(data) => {
                self.live.error = Some(data.clone());
                self.live.status = None;
            }
        }
    }
}
