//! Bookkeeping Assistant Runtime
//!
//! An LLM-driven assistant embedded in a bookkeeping product:
//! - Runs a bounded conversational loop that interleaves model calls with
//!   cancellable, budgeted tool calls
//! - Keeps two memory tiers: per-conversation sessions and durable
//!   cross-session memory records, each with its own lifecycle
//! - Gates every model-initiated ledger write behind a balanced-entry check
//! - Ages out sessions, memories, and audit history with a retention sweep
//!
//! TURN SHAPE:
//! CONTEXT → MODEL → TOOLS → OBSERVE → (repeat) → ANSWER

pub mod agent;
pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod provider;
pub mod repos;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use config::{CleanupConfig, RuntimeConfig};
pub use models::*;
