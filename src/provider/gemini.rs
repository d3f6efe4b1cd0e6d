//! Gemini API provider with native function calling.
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::error::AgentError;
use crate::models::{ChatMessage, MessageRole, ModelResponse, ToolCallRequest, ToolSpec};
use crate::provider::ModelProvider;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    fn request_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    async fn complete(
        &self,
        system: &str,
        transcript: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelResponse> {
        if self.api_key.is_empty() {
            return Err(AgentError::ProviderError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let request = build_request(system, transcript, tools);

        debug!(model = %self.model, turns = transcript.len(), "Calling Gemini API");

        let response = self
            .client
            .post(self.request_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                AgentError::ProviderError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(AgentError::ProviderError(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AgentError::ProviderError(format!("Gemini parse error: {}", e))
        })?;

        response_to_model(gemini_response)
    }
}

/// Map the neutral transcript onto Gemini's content roles. System
/// instructions ride the dedicated field, so System turns are skipped;
/// tool observations go back as functionResponse parts under "user".
fn build_request(system: &str, transcript: &[ChatMessage], tools: &[ToolSpec]) -> GeminiRequest {
    let mut contents = Vec::with_capacity(transcript.len());

    for message in transcript {
        match message.role {
            MessageRole::User => contents.push(Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: Some(message.content.clone()),
                    ..Part::default()
                }],
            }),
            MessageRole::Agent => {
                let mut parts = Vec::new();
                if !message.content.is_empty() {
                    parts.push(Part {
                        text: Some(message.content.clone()),
                        ..Part::default()
                    });
                }
                for call in &message.tool_calls {
                    parts.push(Part {
                        function_call: Some(FunctionCall {
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        }),
                        ..Part::default()
                    });
                }
                if !parts.is_empty() {
                    contents.push(Content {
                        role: "model".to_string(),
                        parts,
                    });
                }
            }
            MessageRole::Tool => {
                let name = message.tool_name.clone().unwrap_or_default();
                let response = serde_json::from_str::<Value>(&message.content)
                    .unwrap_or_else(|_| json!({ "output": message.content }));
                contents.push(Content {
                    role: "user".to_string(),
                    parts: vec![Part {
                        function_response: Some(FunctionResponse { name, response }),
                        ..Part::default()
                    }],
                });
            }
            MessageRole::System => {}
        }
    }

    let declarations = if tools.is_empty() {
        None
    } else {
        Some(vec![ToolDeclarations {
            function_declarations: tools
                .iter()
                .map(|spec| FunctionDeclaration {
                    name: spec.name.clone(),
                    description: spec.description.clone(),
                    parameters: spec.parameters.clone(),
                })
                .collect(),
        }])
    };

    GeminiRequest {
        contents,
        tools: declarations,
        system_instruction: SystemInstruction {
            parts: vec![Part {
                text: Some(system.to_string()),
                ..Part::default()
            }],
        },
        generation_config: GenerationConfig {
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 2048,
        },
    }
}

fn response_to_model(response: GeminiResponse) -> Result<ModelResponse> {
    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        AgentError::ProviderError("No response from Gemini API".to_string())
    })?;

    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();

    if let Some(content) = candidate.content {
        for part in content.parts {
            if let Some(text) = part.text {
                if !text.is_empty() {
                    texts.push(text);
                }
            }
            if let Some(call) = part.function_call {
                tool_calls.push(ToolCallRequest::new(&call.name, call.args));
            }
        }
    }

    let text = if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    };

    Ok(ModelResponse { text, tool_calls })
}

//
// ================= Wire types =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDeclarations>>,
    system_instruction: SystemInstruction,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
}
