use bookkeeping_assistant::{
    config::CleanupConfig,
    memory::lifecycle::LifecycleManager,
    memory::store::MemoryStore,
};
use std::sync::Arc;
use tracing::info;

/// One-shot retention sweep, meant to run from cron or a scheduler.
/// Exits nonzero when any policy failed so the scheduler can alert.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config = CleanupConfig::from_env();
    info!(
        unused_memory_days = config.unused_memory_days,
        low_confidence_threshold = config.low_confidence_threshold,
        inactive_session_days = config.inactive_session_days,
        audit_retention_days = config.audit_retention_days,
        "Starting memory cleanup sweep"
    );

    let store = Arc::new(MemoryStore::from_env());
    let lifecycle = LifecycleManager::new(store.clone(), config);

    let report = lifecycle.run().await;

    println!("=== CLEANUP REPORT ===");
    println!("Expired memories removed:        {}", report.expired_memories);
    println!("Unused memories removed:         {}", report.unused_memories);
    println!("Low-confidence memories removed: {}", report.low_confidence_memories);
    println!("Sessions archived:               {}", report.sessions_archived);
    println!("Sessions deleted:                {}", report.sessions_deleted);
    println!("Audit entries trimmed:           {}", report.audit_entries_trimmed);
    println!("Duration:                        {} ms", report.duration_ms);

    let stats = lifecycle.stats().await?;
    println!(
        "Store now holds {} active memories, {} active sessions, {} archived",
        stats.active_memories, stats.active_sessions, stats.archived_sessions
    );

    if !report.errors.is_empty() {
        for error in &report.errors {
            eprintln!("cleanup policy failed: {}", error);
        }
        std::process::exit(1);
    }

    Ok(())
}
