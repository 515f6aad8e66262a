use grounded_answer_orchestrator::{
    agent::Orchestrator,
    api::{start_server, KeyStatus},
    config::AppConfig,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env();

    if !config.has_search_key() {
        eprintln!("⚠️  FIRECRAWL_API_KEY not set in .env");
    }
    if !config.has_llm_key() {
        eprintln!("⚠️  GROQ_API_KEY not set in .env");
    }

    info!("🚀 Grounded Answer Orchestrator - API Server");
    info!("📍 Port: {}", config.port);

    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);
    let keys = KeyStatus {
        has_firecrawl_key: config.has_search_key(),
        has_groq_key: config.has_llm_key(),
    };

    let turn = orchestrator.config();
    info!(
        search_limit = turn.search_limit,
        excerpt_max_chars = turn.excerpt_max_chars,
        parallel_followups = turn.parallel_followups,
        "✅ Orchestrator initialized"
    );
    info!("📡 Starting API server...");

    start_server(orchestrator, keys, config.port).await?;

    Ok(())
}
