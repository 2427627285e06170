use shariah_advisor::{
    agents::{CalculationAgent, ComplianceAgent, KnowledgeAgent, RoutingAgent},
    api::start_server,
    config::AppConfig,
    llm::GeminiClient,
    memory::SessionStore,
    orchestrator::AgentOrchestrator,
    retrieval::{InMemoryVectorStore, PgVectorStore, VectorStore},
    tools::{HttpToolClient, LocalToolClient, ToolClient},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    if config.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY not set, generation requests will fail");
    }

    info!("Shariah Advisor - API Server");
    info!("Port: {}", config.port);
    info!("Model: {}", config.gemini_model);

    // Create components
    let gemini = Arc::new(GeminiClient::from_config(&config)?);

    let store: Arc<dyn VectorStore> = match &config.database_url {
        Some(url) => Arc::new(PgVectorStore::connect_lazy(url)?),
        None => {
            warn!("DATABASE_URL not set, using an empty in-memory vector store");
            Arc::new(InMemoryVectorStore::new())
        }
    };

    let tools: Arc<dyn ToolClient> = match &config.calculator_tool_url {
        Some(url) => Arc::new(HttpToolClient::new(url)),
        None => {
            info!("CALCULATOR_TOOL_URL not set, running calculations in-process");
            Arc::new(LocalToolClient::new())
        }
    };

    let sessions = SessionStore::new(config.session.clone());

    // Create orchestrator
    let orchestrator = Arc::new(AgentOrchestrator::new(
        RoutingAgent::new(gemini.clone(), config.retry),
        KnowledgeAgent::new(
            gemini.clone(),
            store,
            gemini.clone(),
            config.knowledge.clone(),
            config.retry,
        ),
        CalculationAgent::new(gemini.clone(), tools, config.retry),
        ComplianceAgent::new(gemini, config.compliance.clone(), config.retry),
        sessions.clone(),
        config.orchestrator.clone(),
    ));

    info!("Orchestrator initialized");
    info!("Starting API server...");

    start_server(
        orchestrator,
        config.port,
        config.event_channel_capacity,
        shutdown_signal(),
    )
    .await?;

    sessions.destroy().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
