use std::sync::Arc;

use grounded_answer_orchestrator::{
    agent::{Orchestrator, TurnState},
    config::TurnConfig,
    events::{EventWriter, Frame, FrameBody, StreamEvent},
    llm::ScriptedModel,
    models::{HistoryMessage, SearchResults, Source, TurnRequest},
    reducer::{ApplyOutcome, ClientReducer},
    search::ScriptedSearch,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn wiki_results(n: usize) -> SearchResults {
    SearchResults {
        sources: (1..=n)
            .map(|i| Source {
                url: format!("https://en.wikipedia.org/wiki/Page_{}", i),
                title: format!("Page {}", i),
                markdown: Some(format!(
                    "Intro {i}.\n\nSecond paragraph {i}.\n\n{}\n\nParis is the capital of France.\n\nClosing {i}.",
                    "filler text ".repeat(400)
                )),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

async fn collect(orch: &Orchestrator, request: TurnRequest) -> (TurnState, Vec<Frame>) {
    let (tx, mut rx) = mpsc::channel(512);
    let cancel = CancellationToken::new();
    let mut writer = EventWriter::new(tx, Uuid::new_v4()).with_cancellation(cancel.clone());
    let outcome = orch.run_turn(request, &mut writer, &cancel).await.unwrap();
    drop(writer);

    let mut frames = Vec::new();
    while let Some(f) = rx.recv().await {
        frames.push(f);
    }
    (outcome.final_state().unwrap(), frames)
}

#[tokio::test]
async fn capital_of_france_end_to_end() {
    let llm = Arc::new(
        ScriptedModel::new(["The capital of France is Paris ", "[1]."])
            .with_followups("How many people live in Paris?\nWhat is the Louvre?"),
    );
    let orch = Orchestrator::new(
        Arc::new(ScriptedSearch::with_results(wiki_results(8))),
        llm.clone(),
        TurnConfig::default(),
    );

    let (state, frames) = collect(&orch, TurnRequest::new("What is the capital of France?")).await;
    assert_eq!(state, TurnState::Complete);

    // search limit applies, no ticker for a non-market question
    let sources = frames
        .iter()
        .find_map(|f| match &f.body {
            FrameBody::Data {
                event: StreamEvent::Sources(r),
                ..
            } => Some(r.sources.len()),
            _ => None,
        })
        .unwrap();
    assert_eq!(sources, 6);
    assert!(!frames.iter().any(|f| matches!(
        &f.body,
        FrameBody::Data {
            event: StreamEvent::Ticker(_),
            ..
        }
    )));

    // every excerpt handed to the model stays within budget
    let binding = llm.requests();
    let prompt = &binding[0].last().unwrap().content;
    let context = prompt.split_once("Based on these sources:\n").unwrap().1;
    let blocks: Vec<&str> = context.split("\n\n---\n\n").collect();
    assert_eq!(blocks.len(), 6);
    for block in blocks {
        let excerpt: String = block.splitn(3, '\n').nth(2).unwrap_or("").to_string();
        assert!(excerpt.chars().count() <= 2000);
    }
    assert!(prompt.contains("Paris is the capital of France."));

    // frames survive the wire and fold into the same answer
    let mut reducer = ClientReducer::new();
    reducer.submit_query("What is the capital of France?");
    for frame in &frames {
        let decoded = Frame::from_ndjson(&frame.to_ndjson().unwrap()).unwrap();
        assert_eq!(&decoded, frame);
        assert_eq!(reducer.apply(&decoded), ApplyOutcome::Applied);
    }

    let snapshot = reducer.snapshot();
    assert_eq!(snapshot.answer, "The capital of France is Paris [1].");
    assert_eq!(snapshot.follow_up_questions.len(), 2);
    assert_eq!(snapshot.citations().len(), 1);
    assert!(reducer.live().finished);
}

#[tokio::test]
async fn archived_turns_are_frozen() {
    let orch = Orchestrator::new(
        Arc::new(ScriptedSearch::with_results(wiki_results(2))),
        Arc::new(ScriptedModel::new(["Paris [1]."])),
        TurnConfig::default(),
    );

    let mut reducer = ClientReducer::new();

    reducer.submit_query("What is the capital of France?");
    let (_, first) = collect(&orch, TurnRequest::new("What is the capital of France?")).await;
    for frame in &first {
        reducer.apply(frame);
    }

    let follow_up = TurnRequest::new("And its population?").with_history(vec![
        HistoryMessage::user("What is the capital of France?"),
        HistoryMessage::assistant("Paris [1]."),
    ]);
    reducer.submit_query(follow_up.query.clone());
    let (_, second) = collect(&orch, follow_up).await;
    for frame in &second {
        reducer.apply(frame);
    }

    let archived = reducer.archived(0).unwrap().clone();
    assert_eq!(archived.query.as_deref(), Some("What is the capital of France?"));
    assert_eq!(archived.answer, "Paris [1].");

    // replaying the first turn changes nothing
    for frame in &first {
        assert_eq!(reducer.apply(frame), ApplyOutcome::ForeignTurn);
    }
    assert_eq!(reducer.archived(0), Some(&archived));
    assert_eq!(reducer.current_turn(), Some(1));
    assert_eq!(reducer.snapshot().query.as_deref(), Some("And its population?"));
}
