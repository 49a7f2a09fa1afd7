//! HTTP Handlers

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use zerogpt_core::{
    AgentError, ChatAgent, Message, Reply, ResponseMode, StructuredFormat, Voice,
};

use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub provider_connected: bool,
    pub tools: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Persist and hydrate history for this user
    #[serde(default)]
    pub user_id: Option<String>,
    /// Participant name attached to the message
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Request a structured reply matching this JSON schema
    #[serde(default)]
    pub response_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub schema_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub request_id: String,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    /// Base64 WAV recording sent as input
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AudioChatResponse {
    pub transcript: String,
    /// Base64 WAV reply
    pub audio: String,
    pub audio_id: String,
    pub voice: Voice,
    pub request_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider_connected = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider: state.provider.name().to_owned(),
        provider_connected,
        tools: state.tools.names().into_iter().map(str::to_owned).collect(),
    })
}

/// Chat endpoint; structured when a response schema is supplied
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("chat", %request_id, user = payload.user_id.as_deref());

    async move {
        let mut agent = build_agent(&state, payload.user_id.as_deref())?;

        let mut message = Message::user(payload.message);
        if let Some(name) = payload.name {
            message = message.with_name(name).map_err(error_response)?;
        }
        if let Some(url) = payload.image_url {
            message = message.with_image_url(url);
        }

        let mode = payload.response_schema.map_or(ResponseMode::Plain, |schema| {
            let name = payload.schema_name.unwrap_or_else(|| "response".into());
            ResponseMode::Structured(StructuredFormat::new(name, schema))
        });

        let reply = agent
            .send_messages(mode, vec![message])
            .await
            .map_err(error_response)?;

        let (message, data) = match reply {
            Reply::Structured(value) => (None, Some(value)),
            other => (other.into_text(), None),
        };

        Ok::<_, ApiError>(Json(ChatResponse {
            message,
            data,
            request_id,
            model: agent.config().model.clone(),
        }))
    }
    .instrument(span)
    .await
}

/// Chat endpoint with a spoken reply
pub async fn audio_chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<AudioChatRequest>,
) -> Result<Json<AudioChatResponse>, ApiError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("audio_chat", %request_id, user = payload.user_id.as_deref());

    async move {
        let voice = payload
            .voice
            .as_deref()
            .map(str::parse::<Voice>)
            .transpose()
            .map_err(error_response)?
            .unwrap_or_default();

        let message = match (payload.message, payload.audio) {
            (None, None) => {
                return Err(bad_request("Either message or audio is required"));
            }
            (text, audio) => {
                let message = Message::user(text.unwrap_or_default());
                match audio {
                    Some(data) => message.with_audio_base64(data),
                    None => message,
                }
            }
        };

        let mut agent = build_agent(&state, payload.user_id.as_deref())?;
        let reply = agent
            .send_messages_audio_response(vec![message], voice)
            .await
            .map_err(error_response)?;

        let audio = reply
            .audio
            .ok_or_else(|| error_response(AgentError::MissingAudioPayload))?;

        Ok::<_, ApiError>(Json(AudioChatResponse {
            transcript: audio.transcript,
            audio: audio.data,
            audio_id: audio.id,
            voice,
            request_id,
        }))
    }
    .instrument(span)
    .await
}

fn build_agent(state: &AppState, user_id: Option<&str>) -> Result<ChatAgent, ApiError> {
    let config = state.agent_config();
    match user_id {
        Some(user_id) => ChatAgent::for_user(
            state.provider.clone(),
            state.tools.clone(),
            state.store.clone(),
            user_id,
            config,
        )
        .map_err(error_response),
        None => Ok(ChatAgent::new(
            state.provider.clone(),
            state.tools.clone(),
            config,
        )),
    }
}

fn bad_request(error: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.into(),
            code: "INVALID_REQUEST".into(),
        }),
    )
}

/// Map an agent failure to a status and error code
fn error_response(e: AgentError) -> ApiError {
    let (status, code) = match &e {
        AgentError::InvalidName(_) | AgentError::Config(_) => {
            (StatusCode::BAD_REQUEST, "INVALID_REQUEST")
        }
        AgentError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
        AgentError::ProviderUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_UNAVAILABLE")
        }
        AgentError::Storage(_) | AgentError::Io(_) | AgentError::Json(_) | AgentError::Other(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
        _ => (StatusCode::BAD_GATEWAY, "AGENT_ERROR"),
    };

    if status.is_server_error() {
        tracing::error!("Agent error: {}", e);
    } else {
        tracing::warn!("Rejected request: {}", e);
    }

    let error = match &e {
        AgentError::Config(msg) => msg.clone(),
        _ => e.user_message(),
    };

    (
        status,
        Json(ErrorResponse {
            error,
            code: code.into(),
        }),
    )
}
