//! One-shot command line client: answers a single question and prints the
//! event stream as it arrives.
//!
//! Usage: `advisor What is Riba?`

use shariah_advisor::{
    agents::{CalculationAgent, ComplianceAgent, KnowledgeAgent, RoutingAgent},
    config::AppConfig,
    llm::GeminiClient,
    memory::SessionStore,
    models::StreamEvent,
    orchestrator::AgentOrchestrator,
    retrieval::{InMemoryVectorStore, PgVectorStore, VectorStore},
    tools::LocalToolClient,
};
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        eprintln!("Usage: advisor <question>");
        std::process::exit(2);
    }

    let config = AppConfig::from_env()?;
    if config.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY not set, generation requests will fail");
    }

    let gemini = Arc::new(GeminiClient::from_config(&config)?);
    let store: Arc<dyn VectorStore> = match &config.database_url {
        Some(url) => Arc::new(PgVectorStore::connect_lazy(url)?),
        None => Arc::new(InMemoryVectorStore::new()),
    };
    let sessions = SessionStore::new(config.session.clone());

    let orchestrator = Arc::new(AgentOrchestrator::new(
        RoutingAgent::new(gemini.clone(), config.retry),
        KnowledgeAgent::new(
            gemini.clone(),
            store,
            gemini.clone(),
            config.knowledge.clone(),
            config.retry,
        ),
        CalculationAgent::new(gemini.clone(), Arc::new(LocalToolClient::new()), config.retry),
        ComplianceAgent::new(gemini, config.compliance.clone(), config.retry),
        sessions.clone(),
        config.orchestrator.clone(),
    ));

    info!(query = %query, "Running query");

    let mut events = orchestrator.stream_query(query, None, config.event_channel_capacity);
    let mut failed = false;
    let mut stdout = std::io::stdout();

    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::Connected { session_id } => println!("Session: {}", session_id),
            StreamEvent::Status { message } => println!("... {}", message),
            StreamEvent::Routing(routing) => println!(
                "Category: {} ({:.2}) - {}\n",
                routing.category, routing.confidence, routing.explanation
            ),
            StreamEvent::Content { token } => {
                print!("{}", token);
                stdout.flush()?;
            }
            StreamEvent::Compliance(compliance) => println!(
                "\n\nCompliance: {} ({:.2}) - {}",
                compliance.status, compliance.confidence, compliance.reasoning
            ),
            StreamEvent::Done(result) => {
                println!("\n=== ANSWER ===\n{}", result.answer);
                if let Some(sources) = &result.sources {
                    for (i, source) in sources.iter().enumerate() {
                        println!("[Source {}] {} ({:.2})", i + 1, source.document_id, source.similarity);
                    }
                }
                println!("\nProcessed in {} ms", result.metadata.processing_time_ms);
            }
            StreamEvent::Error(error) => {
                eprintln!("\nQuery failed [{}]: {}", error.code, error.message);
                failed = true;
            }
        }
    }

    sessions.destroy().await;

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
