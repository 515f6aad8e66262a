use grounded_answer_orchestrator::{
    agent::Orchestrator,
    config::AppConfig,
    llm::ScriptedModel,
    models::{SearchResults, Source, TurnRequest},
    reducer::ClientReducer,
    search::ScriptedSearch,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_QUERY: &str = "What is the capital of France?";

/// Offline providers used when no API keys are configured
fn demo_orchestrator(config: &AppConfig) -> Orchestrator {
    let results = SearchResults {
        sources: vec![
            Source {
                url: "https://en.wikipedia.org/wiki/Paris".to_string(),
                title: "Paris - Wikipedia".to_string(),
                markdown: Some(
                    "Paris is the capital and largest city of France.\n\n\
                     The city is a major European centre of finance, diplomacy and the arts."
                        .to_string(),
                ),
                ..Default::default()
            },
            Source {
                url: "https://www.britannica.com/place/France".to_string(),
                title: "France | Britannica".to_string(),
                description: Some("France, country of northwestern Europe.".to_string()),
                ..Default::default()
            },
        ],
        ..Default::default()
    };

    let llm = ScriptedModel::new([
        "The capital of France is **Paris** [1]. ",
        "France itself lies in northwestern Europe [2].",
    ])
    .with_followups(
        "What is the population of Paris?\n\
         When did Paris become the capital?\n\
         What are the main landmarks in Paris?",
    );

    Orchestrator::new(
        Arc::new(ScriptedSearch::with_results(results)),
        Arc::new(llm),
        config.turn.clone(),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = AppConfig::from_env();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let query = if args.is_empty() {
        DEFAULT_QUERY.to_string()
    } else {
        args.join(" ")
    };

    let orchestrator = if config.has_search_key() && config.has_llm_key() {
        Arc::new(Orchestrator::from_config(&config)?)
    } else {
        eprintln!("⚠️  FIRECRAWL_API_KEY / GROQ_API_KEY not set, using offline demo providers");
        Arc::new(demo_orchestrator(&config))
    };

    info!(query = %query, "Asking");

    let mut reducer = ClientReducer::new();
    reducer.submit_query(query.clone());

    let (_, mut frames) = orchestrator.spawn_turn(TurnRequest::new(query), CancellationToken::new());
    while let Some(frame) = frames.recv().await {
        reducer.apply(&frame);
    }

    let live = reducer.live();
    let snapshot = reducer.snapshot();

    if let Some(error) = &live.error {
        eprintln!("\n=== ERROR ===");
        eprintln!("{}", error.error);
        if let Some(suggestion) = &error.suggestion {
            eprintln!("{}", suggestion);
        }
        if let Some(guidance) = live.error_guidance() {
            eprintln!("→ {}: {}", guidance.action, guidance.action_url);
        }
        return Err(error.error.clone().into());
    }

    println!("\n=== ANSWER ===");
    println!("{}", snapshot.answer);

    if let Some(ticker) = &snapshot.ticker {
        println!("\nTicker: {}", ticker);
    }

    println!("\nSources:");
    for (i, source) in snapshot.sources.iter().enumerate() {
        println!("  [{}] {} ({})", i + 1, source.title, source.url);
    }

    let cited = snapshot.citations();
    if !cited.is_empty() {
        println!("\nCited:");
        for (n, source) in cited {
            println!("  [{}] {}", n, source.title);
        }
    }

    if !snapshot.follow_up_questions.is_empty() {
        println!("\nFollow-up questions:");
        for q in &snapshot.follow_up_questions {
            println!("  - {}", q);
        }
    }

    Ok(())
}
