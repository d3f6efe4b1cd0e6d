use bookkeeping_assistant::{
    agent::AgentLoop,
    api::{stable_uuid_from_string, start_server, ApiState},
    audit::AuditLog,
    config::RuntimeConfig,
    ledger::PostingGuard,
    memory::store::MemoryStore,
    provider::GeminiProvider,
    repos::InMemoryBooks,
    tools::{build_registry, ToolDeps},
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env");
        eprintln!("📌 See .env.example for setup instructions");
        String::new()
    });

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("🚀 Bookkeeping Assistant - API Server");
    info!("📍 Port: {}", api_port);

    // Create components
    let config = RuntimeConfig::from_env();
    let store = Arc::new(MemoryStore::from_env());
    let audit = Arc::new(AuditLog::new(store.clone()));

    // Demo books for the anonymous caller until a real books backend is
    // wired in.
    let books = Arc::new(InMemoryBooks::new());
    books
        .seed_demo_data(stable_uuid_from_string("anonymous-user"))
        .await;

    let posting = Arc::new(PostingGuard::new(books.clone(), books.clone(), audit));
    let deps = ToolDeps {
        accounts: books.clone(),
        invoices: books.clone(),
        customers: books.clone(),
        vendors: books.clone(),
        bills: books.clone(),
        bank: books.clone(),
        posting,
        store: store.clone(),
    };
    let registry = Arc::new(build_registry(&deps));
    let provider = Arc::new(GeminiProvider::new(gemini_api_key));

    let agent = Arc::new(AgentLoop::new(config, provider, registry, store.clone()));

    info!("✅ Agent loop initialized");
    info!("📡 Starting API server...");

    // Start API server
    start_server(ApiState { agent, store }, api_port).await?;

    Ok(())
}
