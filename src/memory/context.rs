//! Renders memory records into the bounded block that rides the system
//! prompt.

use crate::config::RuntimeConfig;
use crate::memory::store::MemoryRecord;
use uuid::Uuid;

const CONTEXT_HEADER: &str = "## What you know about this user\n";

/// Caps how much remembered context a single turn may carry.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    pub max_records: usize,
    pub max_chars: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            max_records: 20,
            max_chars: 4000,
        }
    }
}

impl ContextBuilder {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            max_records: config.max_context_memories,
            max_chars: config.max_context_chars,
        }
    }

    /// Render records in the order given until the character budget runs
    /// out. Returns the block and the ids of the records it includes;
    /// both are empty when nothing fits.
    pub fn render(&self, records: &[MemoryRecord]) -> (String, Vec<Uuid>) {
        let mut block = String::from(CONTEXT_HEADER);
        let mut used = Vec::new();

        for record in records.iter().take(self.max_records) {
            let line = format!(
                "- [{}] {}: {} (confidence {:.2})\n",
                record.category, record.key, record.value, record.confidence
            );
            if block.len() + line.len() > self.max_chars {
                break;
            }
            block.push_str(&line);
            used.push(record.id);
        }

        if used.is_empty() {
            return (String::new(), Vec::new());
        }

        (block, used)
    }
}
