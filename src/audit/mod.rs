//! Audit trail for model-initiated ledger writes.
//!
//! Each committed entry gets a row with a SHA-256 hash of its payload so a
//! later read can detect drift. Rows live in the memory store backend, which
//! lets the retention sweep trim them from whichever process runs it.

use crate::memory::store::MemoryStore;
use crate::models::{format_amount, JournalEntry};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub detail: String,
    pub payload_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Write/read API over the audit rows.
pub struct AuditLog {
    store: Arc<MemoryStore>,
}

impl AuditLog {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Record a committed journal entry.
    pub async fn record_posting(&self, user_id: Uuid, entry: &JournalEntry) -> Result<Uuid> {
        let action = match entry.posted_at {
            Some(_) => "journal_entry_posted",
            None => "journal_entry_drafted",
        };

        let record = AuditEntry {
            id: Uuid::new_v4(),
            user_id,
            action: action.to_string(),
            detail: format!("{} ({})", entry.memo, format_amount(entry.amount())),
            payload_hash: hash_payload(entry),
            created_at: Utc::now(),
        };

        self.store.record_audit_entry(&record).await?;
        Ok(record.id)
    }

    /// Most recent entries first.
    pub async fn list_for_user(&self, user_id: Uuid, limit: usize) -> Result<Vec<AuditEntry>> {
        self.store.audit_entries_for_user(user_id, limit).await
    }

    /// Check a stored row against the current payload.
    pub fn verify_integrity(record: &AuditEntry, entry: &JournalEntry) -> bool {
        record.payload_hash == hash_payload(entry)
    }
}

/// Compute the SHA256 hash of a serializable payload.
/// Streams JSON directly into the hasher, no intermediate String.
pub fn hash_payload<T: Serialize>(payload: &T) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), payload).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryLine, EntryStatus};

    fn sample_entry(user_id: Uuid) -> JournalEntry {
        JournalEntry {
            id: Uuid::new_v4(),
            user_id,
            memo: "Cash sale".to_string(),
            entry_date: Utc::now().date_naive(),
            lines: vec![
                EntryLine {
                    account_id: Uuid::new_v4(),
                    debit: 100.0,
                    credit: 0.0,
                },
                EntryLine {
                    account_id: Uuid::new_v4(),
                    debit: 0.0,
                    credit: 100.0,
                },
            ],
            status: EntryStatus::Posted,
            posted_at: Some(Utc::now()),
            source: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_hash_is_stable_and_tamper_sensitive() {
        let entry = sample_entry(Uuid::new_v4());
        let first = hash_payload(&entry);
        let second = hash_payload(&entry.clone());
        assert_eq!(first, second);

        let mut tampered = entry;
        tampered.lines[0].debit = 200.0;
        assert_ne!(first, hash_payload(&tampered));
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let store = Arc::new(MemoryStore::in_memory());
        let audit = AuditLog::new(store);
        let user_id = Uuid::new_v4();
        let entry = sample_entry(user_id);

        audit.record_posting(user_id, &entry).await.unwrap();

        let rows = audit.list_for_user(user_id, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "journal_entry_posted");
        assert!(rows[0].detail.contains("100.00"));
        assert!(AuditLog::verify_integrity(&rows[0], &entry));

        let mut tampered = entry;
        tampered.memo = "Edited later".to_string();
        assert!(!AuditLog::verify_integrity(&rows[0], &tampered));
    }

    #[tokio::test]
    async fn test_draft_entries_get_their_own_action() {
        let store = Arc::new(MemoryStore::in_memory());
        let audit = AuditLog::new(store);
        let user_id = Uuid::new_v4();

        let mut entry = sample_entry(user_id);
        entry.status = EntryStatus::Draft;
        entry.posted_at = None;

        audit.record_posting(user_id, &entry).await.unwrap();
        let rows = audit.list_for_user(user_id, 10).await.unwrap();
        assert_eq!(rows[0].action, "journal_entry_drafted");
    }
}
