//! Tools that let the model read and write the long-term memory store.

use crate::memory::store::{MemoryCategory, MemoryStore, NewMemory};
use crate::models::{ToolInput, ToolOutput};
use crate::tools::{optional_f64, optional_u64, require_str, Tool};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;

const DEFAULT_CONFIDENCE: f64 = 0.8;

pub struct RememberFactTool {
    store: Arc<MemoryStore>,
}

impl RememberFactTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Tool for RememberFactTool {
    fn name(&self) -> &'static str {
        "remember_fact"
    }

    fn description(&self) -> &'static str {
        "Store a durable fact, preference, or instruction about this user for future sessions"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "category": {
                    "type": "string",
                    "enum": ["preference", "fact", "instruction"],
                    "description": "What kind of memory this is, defaults to fact"
                },
                "key": {
                    "type": "string",
                    "description": "Stable identifier; storing the same key again overwrites"
                },
                "value": {
                    "type": "string",
                    "description": "The content to remember"
                },
                "confidence": {
                    "type": "number",
                    "description": "How certain this is, 0 to 1, defaults to 0.8"
                },
                "ttl_days": {
                    "type": "integer",
                    "description": "Days until the memory expires; omit for no expiry"
                }
            },
            "required": ["key", "value"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let category: MemoryCategory = input
            .parameters
            .get("category")
            .and_then(Value::as_str)
            .unwrap_or("fact")
            .parse()?;

        let memory = NewMemory {
            category,
            key: require_str(&input.parameters, "key")?.to_string(),
            value: require_str(&input.parameters, "value")?.to_string(),
            confidence: optional_f64(&input.parameters, "confidence")
                .unwrap_or(DEFAULT_CONFIDENCE),
            ttl_days: optional_u64(&input.parameters, "ttl_days").map(|days| days as i64),
        };

        let record = self.store.store_memory(input.user_id, memory).await?;
        Ok(ToolOutput::ok(json!({
            "stored": true,
            "key": record.key,
            "category": record.category,
            "confidence": record.confidence,
        })))
    }
}

pub struct RecallMemoriesTool {
    store: Arc<MemoryStore>,
}

impl RecallMemoriesTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Tool for RecallMemoriesTool {
    fn name(&self) -> &'static str {
        "recall_memories"
    }

    fn description(&self) -> &'static str {
        "Search stored memories about this user by keyword"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keyword to match against memory keys and values"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum results, defaults to 10"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let query = require_str(&input.parameters, "query")?;
        let limit = optional_u64(&input.parameters, "limit").unwrap_or(10) as usize;

        let memories = self
            .store
            .search_memories(input.user_id, query, limit)
            .await?;
        Ok(ToolOutput::ok(json!({
            "items": memories,
            "count": memories.len(),
        })))
    }
}

pub struct ForgetMemoryTool {
    store: Arc<MemoryStore>,
}

impl ForgetMemoryTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Tool for ForgetMemoryTool {
    fn name(&self) -> &'static str {
        "forget_memory"
    }

    fn description(&self) -> &'static str {
        "Forget a stored memory by its key"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {
                    "type": "string",
                    "description": "Key of the memory to forget"
                }
            },
            "required": ["key"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let key = require_str(&input.parameters, "key")?;
        let forgotten = self.store.deactivate_memory(input.user_id, key).await?;
        Ok(ToolOutput::ok(json!({
            "forgotten": forgotten,
            "key": key,
        })))
    }
}
