//! The agent loop - one bounded conversational turn
//!
//! CONTEXT → MODEL → TOOLS → OBSERVE → (repeat) → ANSWER

use crate::config::RuntimeConfig;
use crate::memory::context::ContextBuilder;
use crate::memory::store::{MemoryStore, SessionRecord};
use crate::models::{ChatMessage, MessageRole, ToolInput, ToolOutput, TurnOutcome};
use crate::provider::ModelProvider;
use crate::tools::{ResourceGuard, ToolRegistry};
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

const BASE_PROMPT: &str = r#"You are a bookkeeping assistant for a small business.

Guidelines:
- Answer from the books: look figures up with the read tools before stating them
- Record money movements with the posting tools; never claim an entry exists without posting it
- Every entry must balance, so state both sides when you describe one
- Store durable facts about the user with remember_fact when they share them
- Be concise and use plain business language, amounts formatted to two decimals

When a tool fails, read the error, fix your request, and try again or explain the problem."#;

const STEP_LIMIT_NOTICE: &str =
    "I ran out of working steps before finishing this request. Here is where I got to; \
     ask me to continue and I will pick it up from there.";

const EMPTY_ANSWER: &str = "I could not produce an answer for that request.";

/// System instructions for one turn: persona, today's date, and whatever
/// the memory store knows about this user.
fn build_system_instructions(memory_block: &str) -> String {
    let mut system = String::from(BASE_PROMPT);
    system.push_str(&format!(
        "\n\nToday's date: {}",
        Utc::now().format("%Y-%m-%d")
    ));

    if !memory_block.is_empty() {
        system.push_str("\n\n");
        system.push_str(memory_block);
    }

    system
}

/// What the model sees of a tool result.
fn observation_content(output: &ToolOutput) -> String {
    output.data.to_string()
}

/// Drives one conversational turn: assembles context, lets the model call
/// tools for a bounded number of rounds, and returns the final answer.
pub struct AgentLoop {
    config: RuntimeConfig,
    provider: Arc<dyn ModelProvider>,
    registry: Arc<ToolRegistry>,
    store: Arc<MemoryStore>,
}

impl AgentLoop {
    pub fn new(
        config: RuntimeConfig,
        provider: Arc<dyn ModelProvider>,
        registry: Arc<ToolRegistry>,
        store: Arc<MemoryStore>,
    ) -> Self {
        Self {
            config,
            provider,
            registry,
            store,
        }
    }

    /// Run one turn to completion. Turns against the same session are
    /// serialized; a second caller waits rather than interleaving.
    ///
    /// An Err here means the model side broke mid-turn. Tool failures never
    /// surface this way; they return to the model as observations.
    pub async fn run_turn(
        &self,
        user_id: Uuid,
        session: &SessionRecord,
        user_message: &str,
    ) -> Result<TurnOutcome> {
        let turn_lock = self.store.turn_lock(session.id).await;
        let _serialized = turn_lock.lock().await;

        let started = Instant::now();
        info!(
            session_id = ?session.id,
            user_id = ?user_id,
            "Agent turn started"
        );

        let memory_block = match self
            .store
            .build_context(user_id, &ContextBuilder::from_config(&self.config))
            .await
        {
            Ok(block) => block,
            Err(error) => {
                warn!("Failed to build memory context, continuing without it: {}", error);
                String::new()
            }
        };
        let system = build_system_instructions(&memory_block);

        let mut transcript = self.load_transcript(session.id, user_id).await;
        transcript.push(ChatMessage::user(user_message));

        let catalog = self.registry.catalog();
        let guard = ResourceGuard::new(self.registry.clone(), self.config.clone());

        let mut final_text: Option<String> = None;
        let mut forced_end = false;
        let mut steps = 0;

        for step in 1..=self.config.max_steps {
            steps = step;

            let response = self
                .provider
                .complete(&system, &transcript, &catalog)
                .await?;

            if let Some(text) = &response.text {
                if !text.trim().is_empty() {
                    final_text = Some(text.clone());
                }
            }

            if response.tool_calls.is_empty() {
                break;
            }

            transcript.push(ChatMessage::agent_with_calls(
                response.text.clone(),
                response.tool_calls.clone(),
            ));

            // Out of rounds: pending calls are dropped, not executed.
            if step == self.config.max_steps {
                warn!(
                    session_id = ?session.id,
                    steps = step,
                    pending = response.tool_calls.len(),
                    "Step budget exhausted with tool calls pending"
                );
                forced_end = true;
                break;
            }

            for call in &response.tool_calls {
                let input = ToolInput {
                    user_id,
                    session_id: session.id,
                    parameters: call.arguments.clone(),
                };
                let invocation = guard.execute(step, &call.name, &input).await;

                debug!(
                    tool = %invocation.tool_name,
                    step,
                    success = invocation.output.success,
                    duration_ms = invocation.duration_ms,
                    "Tool observation recorded"
                );

                transcript.push(ChatMessage::tool(
                    &call.name,
                    observation_content(&invocation.output),
                ));
            }
        }

        let text = match final_text {
            Some(text) => text,
            None if forced_end => STEP_LIMIT_NOTICE.to_string(),
            None => EMPTY_ANSWER.to_string(),
        };
        let tool_calls = guard.calls_made();

        info!(
            session_id = ?session.id,
            steps,
            tool_calls,
            forced_end,
            duration_ms = started.elapsed().as_millis() as u64,
            "Agent turn complete"
        );

        Ok(TurnOutcome {
            session_id: session.id,
            text,
            steps,
            tool_calls,
        })
    }

    async fn load_transcript(&self, session_id: Uuid, user_id: Uuid) -> Vec<ChatMessage> {
        let turns = match self
            .store
            .session_turns(session_id, user_id, self.config.transcript_window)
            .await
        {
            Ok(turns) => turns,
            Err(error) => {
                warn!("Failed to load session history, starting clean: {}", error);
                return Vec::new();
            }
        };

        turns
            .into_iter()
            .filter_map(|turn| match turn.role {
                MessageRole::User => Some(ChatMessage::user(turn.content)),
                MessageRole::Agent => Some(ChatMessage::agent(turn.content)),
                MessageRole::System | MessageRole::Tool => None,
            })
            .collect()
    }

    /// Persist the finished exchange without holding up the response.
    /// Failures are logged; the user already has their answer.
    pub fn spawn_save_exchange(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        user_message: String,
        answer: String,
    ) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(error) = store
                .save_turn(session_id, user_id, MessageRole::User, &user_message)
                .await
            {
                warn!(session_id = ?session_id, "Failed to save user turn: {}", error);
            }
            if let Err(error) = store
                .save_turn(session_id, user_id, MessageRole::Agent, &answer)
                .await
            {
                warn!(session_id = ?session_id, "Failed to save agent turn: {}", error);
            }
        });
    }
}
