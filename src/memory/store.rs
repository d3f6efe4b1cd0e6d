//! Session and durable-memory storage.
//!
//! Two tiers with separate lifecycles: per-conversation sessions carry the
//! turn log and are archived or deleted wholesale; memory records are
//! cross-session facts upserted by (user_id, key) and expired individually.
//! Audit rows share the same backend so retention trimming reaches them in
//! whichever process runs the sweep.
//!
//! Backed by Postgres when POSTGRES_URL / DATABASE_URL is set, otherwise by
//! in-memory maps.

use crate::audit::AuditEntry;
use crate::error::AgentError;
use crate::memory::context::ContextBuilder;
use crate::models::MessageRole;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

//
// ================= Records =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Derived from the first user turn; None until then
    pub title: Option<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTurn {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Preference,
    Fact,
    Instruction,
}

impl MemoryCategory {
    fn as_db(&self) -> &'static str {
        match self {
            MemoryCategory::Preference => "preference",
            MemoryCategory::Fact => "fact",
            MemoryCategory::Instruction => "instruction",
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db())
    }
}

impl FromStr for MemoryCategory {
    type Err = AgentError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "preference" => Ok(MemoryCategory::Preference),
            "fact" => Ok(MemoryCategory::Fact),
            "instruction" => Ok(MemoryCategory::Instruction),
            other => Err(AgentError::ValidationError(format!(
                "unknown memory category '{}'",
                other
            ))),
        }
    }
}

/// A durable cross-session fact about a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category: MemoryCategory,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    /// Recency of use, falling back to creation for never-used records.
    pub fn recency(&self) -> DateTime<Utc> {
        self.last_used_at.unwrap_or(self.created_at)
    }
}

/// Input for storing (or re-storing) a memory.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMemory {
    pub category: MemoryCategory,
    pub key: String,
    pub value: String,
    pub confidence: f64,
    pub ttl_days: Option<i64>,
}

/// Read-only counts for observability.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryStats {
    pub active_memories: u64,
    pub inactive_memories: u64,
    pub expired_memories: u64,
    pub active_sessions: u64,
    pub archived_sessions: u64,
    pub total_turns: u64,
    pub audit_entries: u64,
}

//
// ================= Store =================
//

enum StoreBackend {
    InMemory {
        sessions: RwLock<HashMap<Uuid, SessionRecord>>,
        turns: RwLock<HashMap<Uuid, Vec<SessionTurn>>>,
        memories: RwLock<HashMap<Uuid, MemoryRecord>>,
        audit: RwLock<Vec<AuditEntry>>,
    },
    Postgres {
        pool: PgPool,
        schema_ready: OnceCell<()>,
    },
}

pub struct MemoryStore {
    backend: StoreBackend,
    turn_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl MemoryStore {
    pub fn in_memory() -> Self {
        Self {
            backend: StoreBackend::InMemory {
                sessions: RwLock::new(HashMap::new()),
                turns: RwLock::new(HashMap::new()),
                memories: RwLock::new(HashMap::new()),
                audit: RwLock::new(Vec::new()),
            },
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            backend: StoreBackend::Postgres {
                pool,
                schema_ready: OnceCell::new(),
            },
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Pick the backend from the environment, falling back to in-memory.
    pub fn from_env() -> Self {
        let database_url = env::var("POSTGRES_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .ok();

        if let Some(url) = database_url {
            match sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect_lazy(&url)
            {
                Ok(pool) => {
                    info!("Memory store backend: postgres");
                    return Self::postgres(pool);
                }
                Err(error) => {
                    warn!(
                        "Failed to initialize postgres memory backend, falling back to in-memory: {}",
                        error
                    );
                }
            }
        }

        info!("Memory store backend: in-memory");
        Self::in_memory()
    }

    async fn ensure_schema_if_needed(&self) -> Result<()> {
        let StoreBackend::Postgres { pool, schema_ready } = &self.backend else {
            return Ok(());
        };

        schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS assistant_sessions (
                      id UUID PRIMARY KEY,
                      user_id UUID NOT NULL,
                      title TEXT,
                      status TEXT NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL,
                      last_activity_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_assistant_sessions_user_activity
                    ON assistant_sessions (user_id, last_activity_at);
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS assistant_turns (
                      id UUID PRIMARY KEY,
                      session_id UUID NOT NULL,
                      user_id UUID NOT NULL,
                      role TEXT NOT NULL,
                      content TEXT NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_assistant_turns_session_time
                    ON assistant_turns (session_id, created_at);
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS assistant_memories (
                      id UUID PRIMARY KEY,
                      user_id UUID NOT NULL,
                      category TEXT NOT NULL,
                      key TEXT NOT NULL,
                      value TEXT NOT NULL,
                      confidence DOUBLE PRECISION NOT NULL,
                      expires_at TIMESTAMPTZ,
                      last_used_at TIMESTAMPTZ,
                      active BOOLEAN NOT NULL DEFAULT TRUE,
                      created_at TIMESTAMPTZ NOT NULL,
                      UNIQUE (user_id, key)
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS assistant_audit_log (
                      id UUID PRIMARY KEY,
                      user_id UUID NOT NULL,
                      action TEXT NOT NULL,
                      detail TEXT NOT NULL,
                      payload_hash TEXT NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_assistant_audit_user_time
                    ON assistant_audit_log (user_id, created_at);
                    "#,
                )
                .execute(pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AgentError::DatabaseError(format!("Failed to initialize memory schema: {}", e))
            })?;

        Ok(())
    }

    /// Per-session lock serializing turns (single writer per session).
    pub async fn turn_lock(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    //
    // ================= Sessions =================
    //

    /// Return the caller's active session, or create a fresh one.
    ///
    /// A requested id that is unknown, archived, or owned by another user
    /// yields a new session rather than an error.
    pub async fn get_or_create_session(
        &self,
        user_id: Uuid,
        session_id: Option<Uuid>,
    ) -> Result<SessionRecord> {
        let now = Utc::now();

        match &self.backend {
            StoreBackend::InMemory { sessions, .. } => {
                let mut locked = sessions.write().await;

                if let Some(requested) = session_id {
                    if let Some(session) = locked.get_mut(&requested) {
                        if session.user_id == user_id && session.status == SessionStatus::Active {
                            session.last_activity_at = now;
                            return Ok(session.clone());
                        }
                    }
                }

                let session = SessionRecord {
                    id: Uuid::new_v4(),
                    user_id,
                    title: None,
                    status: SessionStatus::Active,
                    created_at: now,
                    last_activity_at: now,
                };
                locked.insert(session.id, session.clone());
                Ok(session)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                if let Some(requested) = session_id {
                    let row = sqlx::query(
                        r#"
                        SELECT id, user_id, title, status, created_at, last_activity_at
                        FROM assistant_sessions
                        WHERE id = $1 AND user_id = $2 AND status = 'active'
                        "#,
                    )
                    .bind(requested)
                    .bind(user_id)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| db_error("Failed to load session", e))?;

                    if let Some(row) = row {
                        sqlx::query(
                            "UPDATE assistant_sessions SET last_activity_at = $2 WHERE id = $1",
                        )
                        .bind(requested)
                        .bind(now)
                        .execute(pool)
                        .await
                        .map_err(|e| db_error("Failed to touch session", e))?;

                        let mut session = session_from_row(&row);
                        session.last_activity_at = now;
                        return Ok(session);
                    }
                }

                let session = SessionRecord {
                    id: Uuid::new_v4(),
                    user_id,
                    title: None,
                    status: SessionStatus::Active,
                    created_at: now,
                    last_activity_at: now,
                };

                sqlx::query(
                    r#"
                    INSERT INTO assistant_sessions
                      (id, user_id, title, status, created_at, last_activity_at)
                    VALUES ($1, $2, $3, 'active', $4, $5)
                    "#,
                )
                .bind(session.id)
                .bind(session.user_id)
                .bind(&session.title)
                .bind(session.created_at)
                .bind(session.last_activity_at)
                .execute(pool)
                .await
                .map_err(|e| db_error("Failed to create session", e))?;

                Ok(session)
            }
        }
    }

    /// The most recent `limit` turns, oldest first.
    pub async fn session_turns(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<SessionTurn>> {
        match &self.backend {
            StoreBackend::InMemory { turns, .. } => {
                let locked = turns.read().await;
                let mut items: Vec<SessionTurn> = locked
                    .get(&session_id)
                    .map(|list| {
                        list.iter()
                            .filter(|turn| turn.user_id == user_id)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();

                items.sort_by_key(|turn| turn.created_at);
                if items.len() > limit {
                    items.drain(..items.len() - limit);
                }
                Ok(items)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let rows = sqlx::query(
                    r#"
                    SELECT id, session_id, user_id, role, content, created_at
                    FROM assistant_turns
                    WHERE session_id = $1 AND user_id = $2
                    ORDER BY created_at DESC
                    LIMIT $3
                    "#,
                )
                .bind(session_id)
                .bind(user_id)
                .bind(limit as i64)
                .fetch_all(pool)
                .await
                .map_err(|e| db_error("Failed to load session turns", e))?;

                let mut items: Vec<SessionTurn> = rows.iter().map(turn_from_row).collect();
                items.reverse();
                Ok(items)
            }
        }
    }

    /// Append one turn and touch the session.
    ///
    /// The first user turn also titles the session.
    pub async fn save_turn(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<()> {
        let now = Utc::now();
        let turn = SessionTurn {
            id: Uuid::new_v4(),
            session_id,
            user_id,
            role,
            content: content.to_string(),
            created_at: now,
        };
        let title = if role == MessageRole::User {
            derive_title(content)
        } else {
            None
        };

        match &self.backend {
            StoreBackend::InMemory {
                sessions, turns, ..
            } => {
                {
                    let mut locked = turns.write().await;
                    locked.entry(session_id).or_default().push(turn);
                }

                let mut locked = sessions.write().await;
                if let Some(session) = locked.get_mut(&session_id) {
                    session.last_activity_at = now;
                    if session.title.is_none() {
                        session.title = title;
                    }
                }
                Ok(())
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                sqlx::query(
                    r#"
                    INSERT INTO assistant_turns
                      (id, session_id, user_id, role, content, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(turn.id)
                .bind(turn.session_id)
                .bind(turn.user_id)
                .bind(role_to_db(role))
                .bind(&turn.content)
                .bind(turn.created_at)
                .execute(pool)
                .await
                .map_err(|e| db_error("Failed to insert turn", e))?;

                sqlx::query(
                    r#"
                    UPDATE assistant_sessions
                    SET last_activity_at = $2, title = COALESCE(title, $3)
                    WHERE id = $1 AND user_id = $4
                    "#,
                )
                .bind(session_id)
                .bind(now)
                .bind(&title)
                .bind(user_id)
                .execute(pool)
                .await
                .map_err(|e| db_error("Failed to touch session", e))?;

                Ok(())
            }
        }
    }

    //
    // ================= Memory records =================
    //

    /// Assemble the bounded context block and refresh the last-used stamp of
    /// every record that made it in.
    pub async fn build_context(&self, user_id: Uuid, builder: &ContextBuilder) -> Result<String> {
        let candidates = self.context_memories(user_id, builder.max_records).await?;
        let (block, used) = builder.render(&candidates);

        if !used.is_empty() {
            self.touch_memories(user_id, &used).await?;
        }

        Ok(block)
    }

    /// Active, non-expired records ordered by recency of use.
    pub async fn context_memories(&self, user_id: Uuid, limit: usize) -> Result<Vec<MemoryRecord>> {
        let now = Utc::now();

        match &self.backend {
            StoreBackend::InMemory { memories, .. } => {
                let locked = memories.read().await;
                let mut items: Vec<MemoryRecord> = locked
                    .values()
                    .filter(|record| record.user_id == user_id)
                    .filter(|record| record.active && !record.is_expired(now))
                    .cloned()
                    .collect();

                items.sort_by_key(|record| std::cmp::Reverse(record.recency()));
                items.truncate(limit);
                Ok(items)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let rows = sqlx::query(
                    r#"
                    SELECT id, user_id, category, key, value, confidence,
                           expires_at, last_used_at, active, created_at
                    FROM assistant_memories
                    WHERE user_id = $1
                      AND active
                      AND (expires_at IS NULL OR expires_at > $2)
                    ORDER BY COALESCE(last_used_at, created_at) DESC
                    LIMIT $3
                    "#,
                )
                .bind(user_id)
                .bind(now)
                .bind(limit as i64)
                .fetch_all(pool)
                .await
                .map_err(|e| db_error("Failed to load context memories", e))?;

                Ok(rows.iter().map(memory_from_row).collect())
            }
        }
    }

    async fn touch_memories(&self, user_id: Uuid, ids: &[Uuid]) -> Result<()> {
        let now = Utc::now();

        match &self.backend {
            StoreBackend::InMemory { memories, .. } => {
                let mut locked = memories.write().await;
                for id in ids {
                    if let Some(record) = locked.get_mut(id) {
                        if record.user_id == user_id {
                            record.last_used_at = Some(now);
                        }
                    }
                }
                Ok(())
            }
            StoreBackend::Postgres { pool, .. } => {
                sqlx::query(
                    r#"
                    UPDATE assistant_memories
                    SET last_used_at = $2
                    WHERE user_id = $1 AND id = ANY($3)
                    "#,
                )
                .bind(user_id)
                .bind(now)
                .bind(ids.to_vec())
                .execute(pool)
                .await
                .map_err(|e| db_error("Failed to refresh memory usage", e))?;

                Ok(())
            }
        }
    }

    /// Upsert a memory by (user_id, key). Re-storing a soft-deleted key
    /// reactivates it; creation time and id survive the update.
    pub async fn store_memory(&self, user_id: Uuid, memory: NewMemory) -> Result<MemoryRecord> {
        let key = memory.key.trim().to_string();
        if key.is_empty() {
            return Err(AgentError::ValidationError(
                "memory key must not be empty".to_string(),
            ));
        }
        if memory.value.trim().is_empty() {
            return Err(AgentError::ValidationError(
                "memory value must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let confidence = memory.confidence.clamp(0.0, 1.0);
        let expires_at = memory.ttl_days.map(|days| now + chrono::Duration::days(days));

        match &self.backend {
            StoreBackend::InMemory { memories, .. } => {
                let mut locked = memories.write().await;

                let existing = locked
                    .values_mut()
                    .find(|record| record.user_id == user_id && record.key == key);

                if let Some(record) = existing {
                    record.category = memory.category;
                    record.value = memory.value;
                    record.confidence = confidence;
                    record.expires_at = expires_at;
                    record.active = true;
                    return Ok(record.clone());
                }

                let record = MemoryRecord {
                    id: Uuid::new_v4(),
                    user_id,
                    category: memory.category,
                    key,
                    value: memory.value,
                    confidence,
                    expires_at,
                    last_used_at: None,
                    active: true,
                    created_at: now,
                };
                locked.insert(record.id, record.clone());
                Ok(record)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let row = sqlx::query(
                    r#"
                    INSERT INTO assistant_memories
                      (id, user_id, category, key, value, confidence,
                       expires_at, last_used_at, active, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, TRUE, $8)
                    ON CONFLICT (user_id, key) DO UPDATE
                      SET category = EXCLUDED.category,
                          value = EXCLUDED.value,
                          confidence = EXCLUDED.confidence,
                          expires_at = EXCLUDED.expires_at,
                          active = TRUE
                    RETURNING id, user_id, category, key, value, confidence,
                              expires_at, last_used_at, active, created_at
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(memory.category.as_db())
                .bind(&key)
                .bind(&memory.value)
                .bind(confidence)
                .bind(expires_at)
                .bind(now)
                .fetch_one(pool)
                .await
                .map_err(|e| db_error("Failed to store memory", e))?;

                Ok(memory_from_row(&row))
            }
        }
    }

    /// Case-insensitive substring search over keys and values of active,
    /// non-expired records, ordered by confidence then recency. Recall
    /// counts as use: every hit's last-used timestamp is refreshed.
    pub async fn search_memories(
        &self,
        user_id: Uuid,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let now = Utc::now();
        let needle = query.trim().to_lowercase();

        let items = match &self.backend {
            StoreBackend::InMemory { memories, .. } => {
                let locked = memories.read().await;
                let mut items: Vec<MemoryRecord> = locked
                    .values()
                    .filter(|record| record.user_id == user_id)
                    .filter(|record| record.active && !record.is_expired(now))
                    .filter(|record| {
                        record.key.to_lowercase().contains(&needle)
                            || record.value.to_lowercase().contains(&needle)
                    })
                    .cloned()
                    .collect();

                items.sort_by(|a, b| {
                    b.confidence
                        .partial_cmp(&a.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| b.recency().cmp(&a.recency()))
                });
                items.truncate(limit);
                items
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let pattern = format!("%{}%", needle);
                let rows = sqlx::query(
                    r#"
                    SELECT id, user_id, category, key, value, confidence,
                           expires_at, last_used_at, active, created_at
                    FROM assistant_memories
                    WHERE user_id = $1
                      AND active
                      AND (expires_at IS NULL OR expires_at > $2)
                      AND (key ILIKE $3 OR value ILIKE $3)
                    ORDER BY confidence DESC, COALESCE(last_used_at, created_at) DESC
                    LIMIT $4
                    "#,
                )
                .bind(user_id)
                .bind(now)
                .bind(pattern)
                .bind(limit as i64)
                .fetch_all(pool)
                .await
                .map_err(|e| db_error("Failed to search memories", e))?;

                rows.iter().map(memory_from_row).collect()
            }
        };

        if !items.is_empty() {
            let ids: Vec<Uuid> = items.iter().map(|record| record.id).collect();
            self.touch_memories(user_id, &ids).await?;
        }

        Ok(items)
    }

    /// Soft-delete one memory by key. Returns whether anything changed.
    pub async fn deactivate_memory(&self, user_id: Uuid, key: &str) -> Result<bool> {
        match &self.backend {
            StoreBackend::InMemory { memories, .. } => {
                let mut locked = memories.write().await;
                let record = locked
                    .values_mut()
                    .find(|record| record.user_id == user_id && record.key == key && record.active);

                match record {
                    Some(record) => {
                        record.active = false;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let result = sqlx::query(
                    "UPDATE assistant_memories SET active = FALSE WHERE user_id = $1 AND key = $2 AND active",
                )
                .bind(user_id)
                .bind(key)
                .execute(pool)
                .await
                .map_err(|e| db_error("Failed to deactivate memory", e))?;

                Ok(result.rows_affected() > 0)
            }
        }
    }

    /// Soft-delete every active memory a user has.
    pub async fn deactivate_user_memories(&self, user_id: Uuid) -> Result<u64> {
        match &self.backend {
            StoreBackend::InMemory { memories, .. } => {
                let mut locked = memories.write().await;
                let mut affected = 0;
                for record in locked.values_mut() {
                    if record.user_id == user_id && record.active {
                        record.active = false;
                        affected += 1;
                    }
                }
                Ok(affected)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let result = sqlx::query(
                    "UPDATE assistant_memories SET active = FALSE WHERE user_id = $1 AND active",
                )
                .bind(user_id)
                .execute(pool)
                .await
                .map_err(|e| db_error("Failed to deactivate user memories", e))?;

                Ok(result.rows_affected())
            }
        }
    }

    /// Physically remove a user's soft-deleted memories.
    pub async fn purge_deactivated_memories(&self, user_id: Uuid) -> Result<u64> {
        match &self.backend {
            StoreBackend::InMemory { memories, .. } => {
                let mut locked = memories.write().await;
                let before = locked.len();
                locked.retain(|_, record| record.user_id != user_id || record.active);
                Ok((before - locked.len()) as u64)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let result = sqlx::query(
                    "DELETE FROM assistant_memories WHERE user_id = $1 AND NOT active",
                )
                .bind(user_id)
                .execute(pool)
                .await
                .map_err(|e| db_error("Failed to purge memories", e))?;

                Ok(result.rows_affected())
            }
        }
    }

    //
    // ================= Lifecycle predicates =================
    //

    pub async fn delete_expired_memories(&self, now: DateTime<Utc>) -> Result<u64> {
        match &self.backend {
            StoreBackend::InMemory { memories, .. } => {
                let mut locked = memories.write().await;
                let before = locked.len();
                locked.retain(|_, record| !record.is_expired(now));
                Ok((before - locked.len()) as u64)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let result = sqlx::query(
                    "DELETE FROM assistant_memories WHERE expires_at IS NOT NULL AND expires_at <= $1",
                )
                .bind(now)
                .execute(pool)
                .await
                .map_err(|e| db_error("Failed to delete expired memories", e))?;

                Ok(result.rows_affected())
            }
        }
    }

    /// Remove memories neither used nor created since the cutoff.
    pub async fn delete_unused_memories_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        match &self.backend {
            StoreBackend::InMemory { memories, .. } => {
                let mut locked = memories.write().await;
                let before = locked.len();
                locked.retain(|_, record| record.recency() >= cutoff);
                Ok((before - locked.len()) as u64)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let result = sqlx::query(
                    "DELETE FROM assistant_memories WHERE COALESCE(last_used_at, created_at) < $1",
                )
                .bind(cutoff)
                .execute(pool)
                .await
                .map_err(|e| db_error("Failed to delete unused memories", e))?;

                Ok(result.rows_affected())
            }
        }
    }

    /// Remove low-confidence records older than the cutoff; younger ones
    /// survive regardless of confidence.
    pub async fn delete_low_confidence_memories(
        &self,
        threshold: f64,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        match &self.backend {
            StoreBackend::InMemory { memories, .. } => {
                let mut locked = memories.write().await;
                let before = locked.len();
                locked.retain(|_, record| {
                    record.confidence >= threshold || record.created_at >= cutoff
                });
                Ok((before - locked.len()) as u64)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let result = sqlx::query(
                    "DELETE FROM assistant_memories WHERE confidence < $1 AND created_at < $2",
                )
                .bind(threshold)
                .bind(cutoff)
                .execute(pool)
                .await
                .map_err(|e| db_error("Failed to delete low-confidence memories", e))?;

                Ok(result.rows_affected())
            }
        }
    }

    pub async fn archive_idle_sessions(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        match &self.backend {
            StoreBackend::InMemory { sessions, .. } => {
                let mut locked = sessions.write().await;
                let mut affected = 0;
                for session in locked.values_mut() {
                    if session.status == SessionStatus::Active && session.last_activity_at < cutoff
                    {
                        session.status = SessionStatus::Archived;
                        affected += 1;
                    }
                }
                Ok(affected)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let result = sqlx::query(
                    "UPDATE assistant_sessions SET status = 'archived' WHERE status = 'active' AND last_activity_at < $1",
                )
                .bind(cutoff)
                .execute(pool)
                .await
                .map_err(|e| db_error("Failed to archive idle sessions", e))?;

                Ok(result.rows_affected())
            }
        }
    }

    /// Drop archived sessions idle since before the cutoff, turns included.
    pub async fn delete_archived_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        match &self.backend {
            StoreBackend::InMemory {
                sessions, turns, ..
            } => {
                let mut locked = sessions.write().await;
                let doomed: Vec<Uuid> = locked
                    .values()
                    .filter(|session| {
                        session.status == SessionStatus::Archived
                            && session.last_activity_at < cutoff
                    })
                    .map(|session| session.id)
                    .collect();

                for id in &doomed {
                    locked.remove(id);
                }
                drop(locked);

                let mut locked_turns = turns.write().await;
                for id in &doomed {
                    locked_turns.remove(id);
                }

                Ok(doomed.len() as u64)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let mut tx = pool
                    .begin()
                    .await
                    .map_err(|e| db_error("Failed to begin session cleanup", e))?;

                sqlx::query(
                    r#"
                    DELETE FROM assistant_turns
                    WHERE session_id IN (
                      SELECT id FROM assistant_sessions
                      WHERE status = 'archived' AND last_activity_at < $1
                    )
                    "#,
                )
                .bind(cutoff)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to delete turns of dead sessions", e))?;

                let result = sqlx::query(
                    "DELETE FROM assistant_sessions WHERE status = 'archived' AND last_activity_at < $1",
                )
                .bind(cutoff)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to delete archived sessions", e))?;

                tx.commit()
                    .await
                    .map_err(|e| db_error("Failed to commit session cleanup", e))?;

                Ok(result.rows_affected())
            }
        }
    }

    pub async fn trim_audit_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        match &self.backend {
            StoreBackend::InMemory { audit, .. } => {
                let mut locked = audit.write().await;
                let before = locked.len();
                locked.retain(|entry| entry.created_at >= cutoff);
                Ok((before - locked.len()) as u64)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let result =
                    sqlx::query("DELETE FROM assistant_audit_log WHERE created_at < $1")
                        .bind(cutoff)
                        .execute(pool)
                        .await
                        .map_err(|e| db_error("Failed to trim audit log", e))?;

                Ok(result.rows_affected())
            }
        }
    }

    //
    // ================= Audit rows =================
    //

    pub async fn record_audit_entry(&self, entry: &AuditEntry) -> Result<()> {
        match &self.backend {
            StoreBackend::InMemory { audit, .. } => {
                audit.write().await.push(entry.clone());
                Ok(())
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                sqlx::query(
                    r#"
                    INSERT INTO assistant_audit_log
                      (id, user_id, action, detail, payload_hash, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(entry.id)
                .bind(entry.user_id)
                .bind(&entry.action)
                .bind(&entry.detail)
                .bind(&entry.payload_hash)
                .bind(entry.created_at)
                .execute(pool)
                .await
                .map_err(|e| db_error("Failed to record audit entry", e))?;

                Ok(())
            }
        }
    }

    pub async fn audit_entries_for_user(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        match &self.backend {
            StoreBackend::InMemory { audit, .. } => {
                let locked = audit.read().await;
                let mut items: Vec<AuditEntry> = locked
                    .iter()
                    .filter(|entry| entry.user_id == user_id)
                    .cloned()
                    .collect();

                items.sort_by_key(|entry| std::cmp::Reverse(entry.created_at));
                items.truncate(limit);
                Ok(items)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let rows = sqlx::query(
                    r#"
                    SELECT id, user_id, action, detail, payload_hash, created_at
                    FROM assistant_audit_log
                    WHERE user_id = $1
                    ORDER BY created_at DESC
                    LIMIT $2
                    "#,
                )
                .bind(user_id)
                .bind(limit as i64)
                .fetch_all(pool)
                .await
                .map_err(|e| db_error("Failed to load audit entries", e))?;

                Ok(rows.iter().map(audit_from_row).collect())
            }
        }
    }

    //
    // ================= Stats =================
    //

    /// Counts by status; never mutates.
    pub async fn stats(&self) -> Result<MemoryStats> {
        let now = Utc::now();

        match &self.backend {
            StoreBackend::InMemory {
                sessions,
                turns,
                memories,
                audit,
            } => {
                let memories = memories.read().await;
                let sessions = sessions.read().await;
                let turns = turns.read().await;
                let audit = audit.read().await;

                let mut stats = MemoryStats::default();
                for record in memories.values() {
                    if record.is_expired(now) {
                        stats.expired_memories += 1;
                    }
                    if !record.active {
                        stats.inactive_memories += 1;
                    } else if !record.is_expired(now) {
                        stats.active_memories += 1;
                    }
                }
                for session in sessions.values() {
                    match session.status {
                        SessionStatus::Active => stats.active_sessions += 1,
                        SessionStatus::Archived => stats.archived_sessions += 1,
                    }
                }
                stats.total_turns = turns.values().map(|list| list.len() as u64).sum();
                stats.audit_entries = audit.len() as u64;
                Ok(stats)
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let memory_row = sqlx::query(
                    r#"
                    SELECT
                      COUNT(*) FILTER (WHERE active AND (expires_at IS NULL OR expires_at > $1)) AS active,
                      COUNT(*) FILTER (WHERE NOT active) AS inactive,
                      COUNT(*) FILTER (WHERE expires_at IS NOT NULL AND expires_at <= $1) AS expired
                    FROM assistant_memories
                    "#,
                )
                .bind(now)
                .fetch_one(pool)
                .await
                .map_err(|e| db_error("Failed to count memories", e))?;

                let session_row = sqlx::query(
                    r#"
                    SELECT
                      COUNT(*) FILTER (WHERE status = 'active') AS active,
                      COUNT(*) FILTER (WHERE status = 'archived') AS archived
                    FROM assistant_sessions
                    "#,
                )
                .fetch_one(pool)
                .await
                .map_err(|e| db_error("Failed to count sessions", e))?;

                let turn_row = sqlx::query("SELECT COUNT(*) AS total FROM assistant_turns")
                    .fetch_one(pool)
                    .await
                    .map_err(|e| db_error("Failed to count turns", e))?;

                let audit_row = sqlx::query("SELECT COUNT(*) AS total FROM assistant_audit_log")
                    .fetch_one(pool)
                    .await
                    .map_err(|e| db_error("Failed to count audit entries", e))?;

                Ok(MemoryStats {
                    active_memories: count_column(&memory_row, "active"),
                    inactive_memories: count_column(&memory_row, "inactive"),
                    expired_memories: count_column(&memory_row, "expired"),
                    active_sessions: count_column(&session_row, "active"),
                    archived_sessions: count_column(&session_row, "archived"),
                    total_turns: count_column(&turn_row, "total"),
                    audit_entries: count_column(&audit_row, "total"),
                })
            }
        }
    }
}

#[cfg(test)]
impl MemoryStore {
    /// Rewind a record's clock so retention tests can age it.
    pub(crate) async fn backdate_memory(
        &self,
        id: Uuid,
        created_at: DateTime<Utc>,
        last_used_at: Option<DateTime<Utc>>,
    ) {
        if let StoreBackend::InMemory { memories, .. } = &self.backend {
            let mut locked = memories.write().await;
            if let Some(record) = locked.get_mut(&id) {
                record.created_at = created_at;
                record.last_used_at = last_used_at;
            }
        }
    }

    pub(crate) async fn backdate_session(&self, id: Uuid, last_activity_at: DateTime<Utc>) {
        if let StoreBackend::InMemory { sessions, .. } = &self.backend {
            let mut locked = sessions.write().await;
            if let Some(session) = locked.get_mut(&id) {
                session.last_activity_at = last_activity_at;
            }
        }
    }
}

//
// ================= Helpers =================
//

/// First user turn, whitespace collapsed, cut to 60 chars.
fn derive_title(content: &str) -> Option<String> {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }

    if collapsed.chars().count() <= 60 {
        Some(collapsed)
    } else {
        let head: String = collapsed.chars().take(60).collect();
        Some(format!("{}…", head.trim_end()))
    }
}

fn db_error(context: &str, error: sqlx::Error) -> AgentError {
    AgentError::DatabaseError(format!("{}: {}", context, error))
}

fn role_to_db(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Agent => "agent",
        MessageRole::System => "system",
        MessageRole::Tool => "tool",
    }
}

fn role_from_db(role: &str) -> MessageRole {
    match role.to_lowercase().as_str() {
        "user" => MessageRole::User,
        "agent" => MessageRole::Agent,
        "system" => MessageRole::System,
        "tool" => MessageRole::Tool,
        _ => MessageRole::User,
    }
}

fn session_status_from_db(status: &str) -> SessionStatus {
    match status.to_lowercase().as_str() {
        "archived" => SessionStatus::Archived,
        _ => SessionStatus::Active,
    }
}

fn category_from_db(category: &str) -> MemoryCategory {
    category.parse().unwrap_or(MemoryCategory::Fact)
}

fn session_from_row(row: &sqlx::postgres::PgRow) -> SessionRecord {
    let status: String = row.try_get("status").unwrap_or_default();

    SessionRecord {
        id: row.try_get("id").unwrap_or_else(|_| Uuid::new_v4()),
        user_id: row.try_get("user_id").unwrap_or_else(|_| Uuid::nil()),
        title: row.try_get("title").ok(),
        status: session_status_from_db(&status),
        created_at: row.try_get("created_at").unwrap_or_else(|_| Utc::now()),
        last_activity_at: row
            .try_get("last_activity_at")
            .unwrap_or_else(|_| Utc::now()),
    }
}

fn turn_from_row(row: &sqlx::postgres::PgRow) -> SessionTurn {
    let role: String = row.try_get("role").unwrap_or_else(|_| "user".to_string());

    SessionTurn {
        id: row.try_get("id").unwrap_or_else(|_| Uuid::new_v4()),
        session_id: row.try_get("session_id").unwrap_or_else(|_| Uuid::nil()),
        user_id: row.try_get("user_id").unwrap_or_else(|_| Uuid::nil()),
        role: role_from_db(&role),
        content: row.try_get("content").unwrap_or_default(),
        created_at: row.try_get("created_at").unwrap_or_else(|_| Utc::now()),
    }
}

fn memory_from_row(row: &sqlx::postgres::PgRow) -> MemoryRecord {
    let category: String = row.try_get("category").unwrap_or_default();

    MemoryRecord {
        id: row.try_get("id").unwrap_or_else(|_| Uuid::new_v4()),
        user_id: row.try_get("user_id").unwrap_or_else(|_| Uuid::nil()),
        category: category_from_db(&category),
        key: row.try_get("key").unwrap_or_default(),
        value: row.try_get("value").unwrap_or_default(),
        confidence: row.try_get("confidence").unwrap_or(0.0),
        expires_at: row.try_get("expires_at").ok(),
        last_used_at: row.try_get("last_used_at").ok(),
        active: row.try_get("active").unwrap_or(true),
        created_at: row.try_get("created_at").unwrap_or_else(|_| Utc::now()),
    }
}

fn audit_from_row(row: &sqlx::postgres::PgRow) -> AuditEntry {
    AuditEntry {
        id: row.try_get("id").unwrap_or_else(|_| Uuid::new_v4()),
        user_id: row.try_get("user_id").unwrap_or_else(|_| Uuid::nil()),
        action: row.try_get("action").unwrap_or_default(),
        detail: row.try_get("detail").unwrap_or_default(),
        payload_hash: row.try_get("payload_hash").unwrap_or_default(),
        created_at: row.try_get("created_at").unwrap_or_else(|_| Utc::now()),
    }
}

fn count_column(row: &sqlx::postgres::PgRow, column: &str) -> u64 {
    row.try_get::<i64, _>(column).unwrap_or(0).max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(key: &str, value: &str, confidence: f64) -> NewMemory {
        NewMemory {
            category: MemoryCategory::Preference,
            key: key.to_string(),
            value: value.to_string(),
            confidence,
            ttl_days: None,
        }
    }

    #[tokio::test]
    async fn test_session_reuse_keeps_one_session() {
        let store = MemoryStore::in_memory();
        let user_id = Uuid::new_v4();

        let first = store.get_or_create_session(user_id, None).await.unwrap();
        let second = store
            .get_or_create_session(user_id, Some(first.id))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.active_sessions, 1);
    }

    #[tokio::test]
    async fn test_unknown_or_foreign_session_gets_fresh_one() {
        let store = MemoryStore::in_memory();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();

        let owned = store.get_or_create_session(owner, None).await.unwrap();

        let unknown = store
            .get_or_create_session(owner, Some(Uuid::new_v4()))
            .await
            .unwrap();
        assert_ne!(unknown.id, owned.id);

        let hijack = store
            .get_or_create_session(other, Some(owned.id))
            .await
            .unwrap();
        assert_ne!(hijack.id, owned.id);
        assert_eq!(hijack.user_id, other);
    }

    #[tokio::test]
    async fn test_first_user_turn_titles_the_session() {
        let store = MemoryStore::in_memory();
        let user_id = Uuid::new_v4();
        let session = store.get_or_create_session(user_id, None).await.unwrap();

        store
            .save_turn(session.id, user_id, MessageRole::User, "  How  much   did I invoice Acme last month? ")
            .await
            .unwrap();
        store
            .save_turn(session.id, user_id, MessageRole::Agent, "You invoiced 1,200.00.")
            .await
            .unwrap();
        store
            .save_turn(session.id, user_id, MessageRole::User, "And the month before?")
            .await
            .unwrap();

        let refreshed = store
            .get_or_create_session(user_id, Some(session.id))
            .await
            .unwrap();
        assert_eq!(
            refreshed.title.as_deref(),
            Some("How much did I invoice Acme last month?")
        );

        let turns = store.session_turns(session.id, user_id, 10).await.unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_turn_window_keeps_most_recent() {
        let store = MemoryStore::in_memory();
        let user_id = Uuid::new_v4();
        let session = store.get_or_create_session(user_id, None).await.unwrap();

        for i in 0..6 {
            store
                .save_turn(session.id, user_id, MessageRole::User, &format!("turn {}", i))
                .await
                .unwrap();
        }

        let turns = store.session_turns(session.id, user_id, 4).await.unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].content, "turn 2");
        assert_eq!(turns[3].content, "turn 5");
    }

    #[tokio::test]
    async fn test_store_memory_upserts_by_key() {
        let store = MemoryStore::in_memory();
        let user_id = Uuid::new_v4();

        let first = store
            .store_memory(user_id, memory("invoice_terms", "Net 30", 0.8))
            .await
            .unwrap();
        let second = store
            .store_memory(user_id, memory("invoice_terms", "Net 15", 0.9))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.value, "Net 15");
        assert_eq!(store.stats().await.unwrap().active_memories, 1);
    }

    #[tokio::test]
    async fn test_confidence_is_clamped() {
        let store = MemoryStore::in_memory();
        let user_id = Uuid::new_v4();

        let record = store
            .store_memory(user_id, memory("k", "v", 7.5))
            .await
            .unwrap();
        assert_eq!(record.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_expired_memory_is_invisible() {
        let store = MemoryStore::in_memory();
        let user_id = Uuid::new_v4();

        let mut stale = memory("old_rate", "Hourly rate was 90", 0.9);
        stale.ttl_days = Some(-1);
        store.store_memory(user_id, stale).await.unwrap();
        store
            .store_memory(user_id, memory("rate", "Hourly rate is 120", 0.9))
            .await
            .unwrap();

        let context = store.context_memories(user_id, 10).await.unwrap();
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].key, "rate");

        let hits = store.search_memories(user_id, "rate", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_search_orders_by_confidence_then_recency() {
        let store = MemoryStore::in_memory();
        let user_id = Uuid::new_v4();

        store
            .store_memory(user_id, memory("office_rent", "Rent is 1500 monthly", 0.5))
            .await
            .unwrap();
        store
            .store_memory(user_id, memory("rent_due_day", "Rent is due on the 1st", 0.9))
            .await
            .unwrap();

        let hits = store.search_memories(user_id, "RENT", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].key, "rent_due_day");
    }

    #[tokio::test]
    async fn test_search_refreshes_last_used() {
        let store = MemoryStore::in_memory();
        let user_id = Uuid::new_v4();

        let stored = store
            .store_memory(user_id, memory("mileage_rate", "Bills mileage at 0.67", 0.8))
            .await
            .unwrap();
        assert!(stored.last_used_at.is_none());

        let hits = store.search_memories(user_id, "mileage", 10).await.unwrap();
        assert_eq!(hits.len(), 1);

        let refreshed = store.context_memories(user_id, 10).await.unwrap();
        assert!(refreshed[0].last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_build_context_refreshes_last_used() {
        let store = MemoryStore::in_memory();
        let user_id = Uuid::new_v4();

        let stored = store
            .store_memory(user_id, memory("terms", "Prefers Net 30", 0.9))
            .await
            .unwrap();
        assert!(stored.last_used_at.is_none());

        let block = store
            .build_context(user_id, &ContextBuilder::default())
            .await
            .unwrap();
        assert!(block.contains("Net 30"));

        let refreshed = store.context_memories(user_id, 10).await.unwrap();
        assert!(refreshed[0].last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_deactivate_then_purge() {
        let store = MemoryStore::in_memory();
        let user_id = Uuid::new_v4();

        store
            .store_memory(user_id, memory("a", "one", 0.9))
            .await
            .unwrap();
        store
            .store_memory(user_id, memory("b", "two", 0.9))
            .await
            .unwrap();

        assert!(store.deactivate_memory(user_id, "a").await.unwrap());
        assert!(!store.deactivate_memory(user_id, "a").await.unwrap());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.active_memories, 1);
        assert_eq!(stats.inactive_memories, 1);

        assert_eq!(store.purge_deactivated_memories(user_id).await.unwrap(), 1);
        assert_eq!(store.stats().await.unwrap().inactive_memories, 0);
    }

    #[tokio::test]
    async fn test_restoring_a_deactivated_key_reactivates_it() {
        let store = MemoryStore::in_memory();
        let user_id = Uuid::new_v4();

        store
            .store_memory(user_id, memory("vat", "Registered for VAT", 0.8))
            .await
            .unwrap();
        store.deactivate_memory(user_id, "vat").await.unwrap();

        let restored = store
            .store_memory(user_id, memory("vat", "Registered for VAT in Q2", 0.8))
            .await
            .unwrap();
        assert!(restored.active);
        assert_eq!(store.stats().await.unwrap().active_memories, 1);
    }

    #[test]
    fn test_derive_title() {
        assert_eq!(derive_title("  hello   world  "), Some("hello world".into()));
        assert_eq!(derive_title("   "), None);

        let long = "a".repeat(80);
        let title = derive_title(&long).unwrap();
        assert!(title.chars().count() <= 61);
        assert!(title.ends_with('…'));
    }
}
