//! Conversation and long-term memory: storage, context assembly, and
//! retention.

pub mod context;
pub mod lifecycle;
pub mod store;

pub use context::ContextBuilder;
pub use lifecycle::{CleanupReport, LifecycleManager};
pub use store::{
    MemoryCategory, MemoryRecord, MemoryStats, MemoryStore, NewMemory, SessionRecord, SessionTurn,
};
