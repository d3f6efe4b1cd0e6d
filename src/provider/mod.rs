//! Model providers: the seam between the agent loop and whichever LLM is
//! answering.

pub mod gemini;

pub use gemini::GeminiProvider;

use crate::models::{ChatMessage, ModelResponse, ToolSpec};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// One model round: system instructions, the transcript so far, and the
/// tool catalog. The provider answers with text, tool calls, or both.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        transcript: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelResponse>;
}

/// Scripted provider for tests and offline demos. Plays back queued
/// responses in order; once the script runs out it answers with plain
/// text so the loop always terminates.
pub struct MockProvider {
    script: Mutex<VecDeque<ModelResponse>>,
}

impl MockProvider {
    pub fn new(script: Vec<ModelResponse>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }

    /// A provider that always answers with the same text.
    pub fn answering(text: &str) -> Self {
        Self::new(vec![ModelResponse::from_text(text)])
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn complete(
        &self,
        _system: &str,
        _transcript: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<ModelResponse> {
        let mut script = self.script.lock().await;
        Ok(script
            .pop_front()
            .unwrap_or_else(|| ModelResponse::from_text("I have nothing further to add.")))
    }
}
