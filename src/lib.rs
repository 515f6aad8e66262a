//! Grounded Answer Orchestrator
//!
//! A streaming search-and-answer service that:
//! - Runs one web search per turn and publishes normalized sources
//! - Builds a bounded, query-relevant excerpt per source
//! - Streams a cited answer from an LLM
//! - Detects a stock ticker when the query has market intent
//! - Suggests follow-up questions
//! - Maps upstream failures to user-facing guidance
//!
//! TURN LIFECYCLE:
//! SEARCHING → SOURCES_READY → GENERATING → FOLLOWUPS_READY → COMPLETE
//! (any stage may end in ERROR)

pub mod agent;
pub mod api;
pub mod config;
pub mod content;
pub mod error;
pub mod events;
pub mod guidance;
pub mod llm;
pub mod models;
pub mod reducer;
pub mod search;
pub mod ticker;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::{Orchestrator, TurnOutcome, TurnState};
pub use config::{AppConfig, TurnConfig};
pub use events::{EventWriter, Frame, FrameBody, StreamEvent};
pub use guidance::{ErrorGuidance, FailureKind};
pub use reducer::{ClientReducer, TurnSnapshot};
pub use ticker::Ticker;
