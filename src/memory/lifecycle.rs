//! Scheduled retention sweep over the memory store.
//!
//! Six policies run in a fixed order, each against the state the previous
//! ones left behind. A policy that fails is recorded in the report and the
//! sweep moves on. Every policy works off absolute cutoffs, so re-running
//! a sweep immediately finds nothing left to do.

use crate::config::CleanupConfig;
use crate::memory::store::{MemoryStats, MemoryStore};
use crate::Result;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// What one sweep did, policy by policy.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub expired_memories: u64,
    pub unused_memories: u64,
    pub low_confidence_memories: u64,
    pub sessions_archived: u64,
    pub sessions_deleted: u64,
    pub audit_entries_trimmed: u64,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl CleanupReport {
    pub fn total_actions(&self) -> u64 {
        self.expired_memories
            + self.unused_memories
            + self.low_confidence_memories
            + self.sessions_archived
            + self.sessions_deleted
            + self.audit_entries_trimmed
    }
}

pub struct LifecycleManager {
    store: Arc<MemoryStore>,
    config: CleanupConfig,
}

impl LifecycleManager {
    pub fn new(store: Arc<MemoryStore>, config: CleanupConfig) -> Self {
        Self { store, config }
    }

    /// Run every retention policy once and report the damage.
    pub async fn run(&self) -> CleanupReport {
        let started = Instant::now();
        let now = Utc::now();
        let mut report = CleanupReport::default();

        match self.store.delete_expired_memories(now).await {
            Ok(count) => report.expired_memories = count,
            Err(error) => report.errors.push(format!("expired memories: {}", error)),
        }

        let unused_cutoff = now - Duration::days(self.config.unused_memory_days);
        match self.store.delete_unused_memories_before(unused_cutoff).await {
            Ok(count) => report.unused_memories = count,
            Err(error) => report.errors.push(format!("unused memories: {}", error)),
        }

        let confidence_cutoff = now - Duration::days(self.config.low_confidence_age_days);
        match self
            .store
            .delete_low_confidence_memories(self.config.low_confidence_threshold, confidence_cutoff)
            .await
        {
            Ok(count) => report.low_confidence_memories = count,
            Err(error) => report
                .errors
                .push(format!("low-confidence memories: {}", error)),
        }

        let idle_cutoff = now - Duration::days(self.config.inactive_session_days);
        match self.store.archive_idle_sessions(idle_cutoff).await {
            Ok(count) => report.sessions_archived = count,
            Err(error) => report.errors.push(format!("session archival: {}", error)),
        }

        let retention_cutoff = now - Duration::days(self.config.archived_session_retention_days);
        match self
            .store
            .delete_archived_sessions_before(retention_cutoff)
            .await
        {
            Ok(count) => report.sessions_deleted = count,
            Err(error) => report.errors.push(format!("session deletion: {}", error)),
        }

        let audit_cutoff = now - Duration::days(self.config.audit_retention_days);
        match self.store.trim_audit_before(audit_cutoff).await {
            Ok(count) => report.audit_entries_trimmed = count,
            Err(error) => report.errors.push(format!("audit trim: {}", error)),
        }

        report.duration_ms = started.elapsed().as_millis() as u64;

        if report.errors.is_empty() {
            info!(
                actions = report.total_actions(),
                expired = report.expired_memories,
                unused = report.unused_memories,
                low_confidence = report.low_confidence_memories,
                archived = report.sessions_archived,
                deleted = report.sessions_deleted,
                audit_trimmed = report.audit_entries_trimmed,
                duration_ms = report.duration_ms,
                "Memory cleanup sweep complete"
            );
        } else {
            warn!(
                actions = report.total_actions(),
                errors = report.errors.len(),
                duration_ms = report.duration_ms,
                "Memory cleanup sweep finished with errors"
            );
        }

        report
    }

    /// Soft-delete all of one user's memories.
    pub async fn forget_user(&self, user_id: Uuid) -> Result<u64> {
        self.store.deactivate_user_memories(user_id).await
    }

    /// Physically drop a user's soft-deleted memories.
    pub async fn purge_user(&self, user_id: Uuid) -> Result<u64> {
        self.store.purge_deactivated_memories(user_id).await
    }

    pub async fn stats(&self) -> Result<MemoryStats> {
        self.store.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::store::{MemoryCategory, NewMemory};
    use crate::models::MessageRole;

    fn memory(key: &str, confidence: f64, ttl_days: Option<i64>) -> NewMemory {
        NewMemory {
            category: MemoryCategory::Fact,
            key: key.to_string(),
            value: format!("value for {}", key),
            confidence,
            ttl_days,
        }
    }

    fn manager(store: Arc<MemoryStore>) -> LifecycleManager {
        LifecycleManager::new(store, CleanupConfig::default())
    }

    #[tokio::test]
    async fn test_expired_records_are_removed_fresh_ones_kept() {
        let store = Arc::new(MemoryStore::in_memory());
        let user_id = Uuid::new_v4();

        store
            .store_memory(user_id, memory("stale", 0.9, Some(-1)))
            .await
            .unwrap();
        store
            .store_memory(user_id, memory("fresh", 0.9, Some(30)))
            .await
            .unwrap();
        store
            .store_memory(user_id, memory("eternal", 0.9, None))
            .await
            .unwrap();

        let report = manager(store.clone()).run().await;
        assert_eq!(report.expired_memories, 1);
        assert!(report.errors.is_empty());

        let remaining = store.context_memories(user_id, 10).await.unwrap();
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_unused_records_age_out() {
        let store = Arc::new(MemoryStore::in_memory());
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let dormant = store
            .store_memory(user_id, memory("dormant", 0.9, None))
            .await
            .unwrap();
        store
            .backdate_memory(dormant.id, now - Duration::days(100), None)
            .await;

        let touched = store
            .store_memory(user_id, memory("touched", 0.9, None))
            .await
            .unwrap();
        store
            .backdate_memory(
                touched.id,
                now - Duration::days(100),
                Some(now - Duration::days(5)),
            )
            .await;

        let report = manager(store.clone()).run().await;
        assert_eq!(report.unused_memories, 1);

        let remaining = store.context_memories(user_id, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, "touched");
    }

    #[tokio::test]
    async fn test_low_confidence_removal_respects_age() {
        let store = Arc::new(MemoryStore::in_memory());
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let old_guess = store
            .store_memory(user_id, memory("old_guess", 0.2, None))
            .await
            .unwrap();
        store
            .backdate_memory(
                old_guess.id,
                now - Duration::days(100),
                Some(now - Duration::days(1)),
            )
            .await;

        let new_guess = store
            .store_memory(user_id, memory("new_guess", 0.2, None))
            .await
            .unwrap();
        store
            .backdate_memory(new_guess.id, now - Duration::days(10), None)
            .await;

        // Keep the unused-memory policy out of the picture.
        let config = CleanupConfig {
            unused_memory_days: 365,
            ..CleanupConfig::default()
        };
        let report = LifecycleManager::new(store.clone(), config).run().await;
        assert_eq!(report.low_confidence_memories, 1);

        let remaining = store.context_memories(user_id, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, "new_guess");
    }

    #[tokio::test]
    async fn test_idle_sessions_archive_then_eventually_delete() {
        let store = Arc::new(MemoryStore::in_memory());
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let idle = store.get_or_create_session(user_id, None).await.unwrap();
        store
            .save_turn(idle.id, user_id, MessageRole::User, "hello")
            .await
            .unwrap();
        store
            .backdate_session(idle.id, now - Duration::days(40))
            .await;

        let active = store.get_or_create_session(user_id, None).await.unwrap();

        let report = manager(store.clone()).run().await;
        assert_eq!(report.sessions_archived, 1);
        assert_eq!(report.sessions_deleted, 0);

        // Once archived long enough, the session and its turns go away.
        store
            .backdate_session(idle.id, now - Duration::days(120))
            .await;
        let report = manager(store.clone()).run().await;
        assert_eq!(report.sessions_deleted, 1);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.archived_sessions, 0);
        assert_eq!(stats.total_turns, 0);

        let resumed = store
            .get_or_create_session(user_id, Some(active.id))
            .await
            .unwrap();
        assert_eq!(resumed.id, active.id);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let store = Arc::new(MemoryStore::in_memory());
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        store
            .store_memory(user_id, memory("stale", 0.9, Some(-1)))
            .await
            .unwrap();
        let session = store.get_or_create_session(user_id, None).await.unwrap();
        store
            .backdate_session(session.id, now - Duration::days(40))
            .await;

        let lifecycle = manager(store.clone());
        let first = lifecycle.run().await;
        assert!(first.total_actions() > 0);

        let second = lifecycle.run().await;
        assert_eq!(second.total_actions(), 0);
        assert!(second.errors.is_empty());
    }

    #[tokio::test]
    async fn test_clean_store_reports_nothing() {
        let store = Arc::new(MemoryStore::in_memory());
        let report = manager(store).run().await;

        assert_eq!(report.total_actions(), 0);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_forget_then_purge_user() {
        let store = Arc::new(MemoryStore::in_memory());
        let user_id = Uuid::new_v4();

        store
            .store_memory(user_id, memory("a", 0.9, None))
            .await
            .unwrap();
        store
            .store_memory(user_id, memory("b", 0.9, None))
            .await
            .unwrap();

        let lifecycle = manager(store.clone());
        assert_eq!(lifecycle.forget_user(user_id).await.unwrap(), 2);
        assert_eq!(lifecycle.purge_user(user_id).await.unwrap(), 2);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.active_memories, 0);
        assert_eq!(stats.inactive_memories, 0);
    }
}
