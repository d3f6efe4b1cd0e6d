//! Runtime and retention configuration
//!
//! Immutable config structs handed to the loop, the resource guard, and the
//! lifecycle sweep at construction. `from_env` reads overrides; anything
//! unset or unparseable keeps its default.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Limits applied to a single conversational turn.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum model rounds per turn before a forced end
    pub max_steps: u32,
    /// Maximum tool executions per turn
    pub max_tool_calls_per_request: u32,
    /// Deadline for a single tool execution
    pub tool_timeout: Duration,
    /// Default cap for list-shaped tool results
    pub max_list_results: usize,
    /// Persisted turns included in the transcript
    pub transcript_window: usize,
    /// Memory records considered for the context block
    pub max_context_memories: usize,
    /// Character budget for the context block
    pub max_context_chars: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_steps: 8,
            max_tool_calls_per_request: 20,
            tool_timeout: Duration::from_secs(10),
            max_list_results: 50,
            transcript_window: 30,
            max_context_memories: 20,
            max_context_chars: 4_000,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_steps: env_parse("ASSISTANT_MAX_STEPS", defaults.max_steps),
            max_tool_calls_per_request: env_parse(
                "ASSISTANT_MAX_TOOL_CALLS",
                defaults.max_tool_calls_per_request,
            ),
            tool_timeout: Duration::from_secs(env_parse(
                "ASSISTANT_TOOL_TIMEOUT_SECS",
                defaults.tool_timeout.as_secs(),
            )),
            max_list_results: env_parse("ASSISTANT_MAX_LIST_RESULTS", defaults.max_list_results),
            transcript_window: env_parse(
                "ASSISTANT_TRANSCRIPT_WINDOW",
                defaults.transcript_window,
            ),
            max_context_memories: env_parse(
                "ASSISTANT_MAX_CONTEXT_MEMORIES",
                defaults.max_context_memories,
            ),
            max_context_chars: env_parse(
                "ASSISTANT_MAX_CONTEXT_CHARS",
                defaults.max_context_chars,
            ),
        }
    }
}

/// Retention windows for the lifecycle sweep.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Memories neither used nor created within this window are dropped
    pub unused_memory_days: i64,
    /// Confidence below which a record becomes eligible for age-based removal
    pub low_confidence_threshold: f64,
    /// Age at which low-confidence records are dropped
    pub low_confidence_age_days: i64,
    /// Sessions idle for this long are archived
    pub inactive_session_days: i64,
    /// Archived sessions idle for longer than this are deleted outright
    pub archived_session_retention_days: i64,
    /// Audit entries older than this are trimmed
    pub audit_retention_days: i64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            unused_memory_days: 90,
            low_confidence_threshold: 0.3,
            low_confidence_age_days: 90,
            inactive_session_days: 30,
            archived_session_retention_days: 90,
            audit_retention_days: 180,
        }
    }
}

impl CleanupConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            unused_memory_days: env_parse(
                "ASSISTANT_UNUSED_MEMORY_DAYS",
                defaults.unused_memory_days,
            ),
            low_confidence_threshold: env_parse(
                "ASSISTANT_LOW_CONFIDENCE_THRESHOLD",
                defaults.low_confidence_threshold,
            ),
            low_confidence_age_days: env_parse(
                "ASSISTANT_LOW_CONFIDENCE_AGE_DAYS",
                defaults.low_confidence_age_days,
            ),
            inactive_session_days: env_parse(
                "ASSISTANT_INACTIVE_SESSION_DAYS",
                defaults.inactive_session_days,
            ),
            archived_session_retention_days: env_parse(
                "ASSISTANT_ARCHIVED_SESSION_RETENTION_DAYS",
                defaults.archived_session_retention_days,
            ),
            audit_retention_days: env_parse(
                "ASSISTANT_AUDIT_RETENTION_DAYS",
                defaults.audit_retention_days,
            ),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
