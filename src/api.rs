//! REST API server for the bookkeeping assistant
//!
//! One conversational endpoint: the session id rides a response header
//! while the answer streams as plain text.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::agent::AgentLoop;
use crate::memory::store::MemoryStore;

/// Header carrying the resolved session id; send it back to continue the
/// same conversation.
pub const SESSION_HEADER: &str = "x-session-id";

const STREAM_CHUNK_CHARS: usize = 400;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub messages: Vec<ChatMessage>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<AgentLoop>,
    pub store: Arc<MemoryStore>,
}

/// =============================
/// Helpers — Caller Identity
/// =============================

pub fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

fn parse_or_stable_uuid(value: Option<&str>, fallback_seed: &str) -> uuid::Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            uuid::Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => stable_uuid_from_string(fallback_seed),
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoint
/// =============================

/// The session is resolved before any streaming starts so the header is
/// always on the response; the turn itself runs in a spawned task feeding
/// the body channel.
async fn chat_handler(State(state): State<ApiState>, Json(req): Json<ChatRequest>) -> Response {
    let Some(last_user_index) = req.messages.iter().rposition(|m| m.role == "user") else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("No user message found".into())),
        )
            .into_response();
    };
    let message = req.messages[last_user_index].content.clone();

    let user_id = parse_or_stable_uuid(req.user_id.as_deref(), "anonymous-user");
    let requested_session = req
        .session_id
        .as_deref()
        .and_then(|value| uuid::Uuid::parse_str(value.trim()).ok());

    let session = match state
        .store
        .get_or_create_session(user_id, requested_session)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to resolve session: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(format!("Failed to resolve session: {}", e))),
            )
                .into_response();
        }
    };

    info!(
        session_id = ?session.id,
        user_id = ?user_id,
        "chat request accepted"
    );

    let (tx, rx) = mpsc::channel::<std::result::Result<String, Infallible>>(8);
    let agent = state.agent.clone();
    let turn_session = session.clone();

    tokio::spawn(async move {
        match agent.run_turn(user_id, &turn_session, &message).await {
            Ok(outcome) => {
                // Persist first; the save must not depend on the client
                // staying connected for the whole stream.
                agent.spawn_save_exchange(
                    user_id,
                    turn_session.id,
                    message,
                    outcome.text.clone(),
                );

                for chunk in chunk_text(&outcome.text, STREAM_CHUNK_CHARS) {
                    if tx.send(Ok(chunk)).await.is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                error!(session_id = ?turn_session.id, "Agent turn failed: {}", e);
                let _ = tx
                    .send(Ok(format!(
                        "Something went wrong handling this request: {}",
                        e
                    )))
                    .await;
            }
        }
    });

    let mut response = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    if let Ok(value) = HeaderValue::from_str(&session.id.to_string()) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

/// Split on char boundaries so multi-byte text streams intact.
fn chunk_text(text: &str, chunk_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_uuid_is_deterministic() {
        let a = stable_uuid_from_string("anonymous-user");
        let b = stable_uuid_from_string("anonymous-user");
        let c = stable_uuid_from_string("someone-else");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.get_version_num(), 4);
    }

    #[test]
    fn test_parse_or_stable_uuid_passes_valid_uuids_through() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            parse_or_stable_uuid(Some(&id.to_string()), "fallback"),
            id
        );

        let derived = parse_or_stable_uuid(Some("alice@example.com"), "fallback");
        assert_eq!(derived, stable_uuid_from_string("alice@example.com"));

        assert_eq!(
            parse_or_stable_uuid(None, "fallback"),
            stable_uuid_from_string("fallback")
        );
    }

    #[test]
    fn test_chunk_text_respects_char_boundaries() {
        let text = "é".repeat(10);
        let chunks = chunk_text(&text, 4);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 4);
        assert_eq!(chunks[2].chars().count(), 2);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_chunk_text_on_empty_input() {
        assert!(chunk_text("", 400).is_empty());
    }
}
