use bookkeeping_assistant::{
    agent::AgentLoop,
    audit::AuditLog,
    config::RuntimeConfig,
    ledger::PostingGuard,
    memory::store::MemoryStore,
    models::{MessageRole, ModelResponse, ToolCallRequest},
    provider::{MockProvider, ModelProvider},
    repos::InMemoryBooks,
    tools::{build_registry, ToolDeps},
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Offline walkthrough: a scripted model records a cash sale against
/// seeded demo books, end to end through the posting guard.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Bookkeeping Assistant demo starting");

    // Create components
    let user_id = Uuid::new_v4();
    let books = Arc::new(InMemoryBooks::new());
    books.seed_demo_data(user_id).await;

    let store = Arc::new(MemoryStore::in_memory());
    let audit = Arc::new(AuditLog::new(store.clone()));
    let posting = Arc::new(PostingGuard::new(books.clone(), books.clone(), audit.clone()));

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

    let provider: Arc<dyn ModelProvider> = Arc::new(MockProvider::new(vec![
        ModelResponse::with_tool_calls(
            None,
            vec![ToolCallRequest::new(
                "record_sale",
                json!({
                    "amount": 250.0,
                    "description": "Consulting income",
                    "payment_method": "cash"
                }),
            )],
        ),
        ModelResponse::from_text("Recorded the 250.00 cash sale to Sales Revenue."),
    ]));

    let agent = AgentLoop::new(
        RuntimeConfig::default(),
        provider,
        registry,
        store.clone(),
    );

    let session = store.get_or_create_session(user_id, None).await?;
    let user_message = "Record a 250 cash sale for consulting";

    info!(
        session_id = ?session.id,
        message = user_message,
        "Running agent turn"
    );

    let outcome = agent.run_turn(user_id, &session, user_message).await?;

    println!("\n=== TURN RESULT ===");
    println!("Session:    {}", outcome.session_id);
    println!("Steps:      {}", outcome.steps);
    println!("Tool calls: {}", outcome.tool_calls);
    println!("Answer:     {}", outcome.text);

    // The server saves turns in the background; the demo does it inline so
    // the history print below is deterministic.
    store
        .save_turn(session.id, user_id, MessageRole::User, user_message)
        .await?;
    store
        .save_turn(session.id, user_id, MessageRole::Agent, &outcome.text)
        .await?;

    println!("\n=== SESSION HISTORY ===");
    for turn in store.session_turns(session.id, user_id, 10).await? {
        println!("  [{:?}] {}", turn.role, turn.content);
    }

    println!("\n=== AUDIT TRAIL ===");
    for entry in audit.list_for_user(user_id, 10).await? {
        println!("  {} {} ({})", entry.created_at, entry.action, entry.detail);
    }

    let stats = store.stats().await?;
    println!("\n=== STORE STATS ===");
    println!("Active sessions: {}", stats.active_sessions);
    println!("Total turns:     {}", stats.total_turns);
    println!("Audit entries:   {}", stats.audit_entries);

    Ok(())
}
