//! LLM Provider Interface
//!
//! Defines the chat-completion surface the agent talks to, along with the
//! request and response payload types. The payloads follow the OpenAI chat
//! completion shape so any compatible endpoint can serve them directly.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zerogpt_core::provider::{CompletionRequest, LlmProvider};
//!
//! let provider = OpenAiProvider::from_env()?;
//! let completion = provider.complete(&request).await?;
//! ```

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::message::Role;
use crate::mode::Voice;

/// Content of a request message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Typed content block
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    InputAudio { input_audio: InputAudio },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }

    pub fn input_audio(data: impl Into<String>, format: AudioFormat) -> Self {
        Self::InputAudio {
            input_audio: InputAudio {
                data: data.into(),
                format,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputAudio {
    /// Base64 encoded audio
    pub data: String,
    pub format: AudioFormat,
}

/// Audio encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

/// Reference to an earlier audio reply, replayed in follow-up requests
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioReference {
    pub id: String,
}

/// A message in provider request format
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: Role,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tool calls requested by an assistant turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,

    /// Correlation id on a tool result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioReference>,
}

impl ProviderMessage {
    pub const fn new(role: Role, content: MessageContent) -> Self {
        Self {
            role,
            content: Some(content),
            name: None,
            tool_calls: None,
            tool_call_id: None,
            audio: None,
        }
    }

    /// Concatenated text of the message, ignoring non-text parts
    pub fn text(&self) -> String {
        match &self.content {
            None => String::new(),
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::Parts(parts)) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// A tool invocation requested by the provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id echoed back on the tool result
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,

    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".into()
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,

    /// Raw JSON argument payload, exactly as the provider produced it
    #[serde(default)]
    pub arguments: String,
}

/// Tool description sent with a request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDescriptor,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl ToolDescriptor {
    pub fn function(
        name: impl Into<String>,
        description: Option<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            kind: function_kind(),
            function: FunctionDescriptor {
                name: name.into(),
                description,
                parameters,
                strict: None,
            },
        }
    }
}

/// Constraint on the shape of the reply
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonSchema { json_schema: JsonSchemaSpec },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonSchemaSpec {
    pub name: String,
    pub schema: serde_json::Value,
    pub strict: bool,
}

/// Output modality
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
}

/// Spoken reply options
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioOptions {
    pub voice: Voice,
    pub format: AudioFormat,
}

/// A chat completion request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier (e.g., "gpt-4o-mini")
    pub model: String,

    pub messages: Vec<ProviderMessage>,

    /// Left out entirely when no tools are registered; some providers
    /// reject an empty array
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDescriptor>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<Modality>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Response from an LLM completion
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    #[serde(default)]
    pub id: Option<String>,

    /// Model that generated this response
    #[serde(default)]
    pub model: String,

    pub choices: Vec<Choice>,

    /// Token usage statistics (if available)
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl Completion {
    /// Wrap a single response message
    pub fn from_message(message: ResponseMessage, finish_reason: FinishReason) -> Self {
        Self {
            id: None,
            model: String::new(),
            choices: vec![Choice {
                index: 0,
                finish_reason: Some(finish_reason),
                message,
            }],
            usage: None,
        }
    }

    /// A terminal text reply
    pub fn from_text(content: impl Into<String>) -> Self {
        Self::from_message(ResponseMessage::assistant(content), FinishReason::Stop)
    }

    /// A reply requesting tool calls
    pub fn from_tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        let message = ResponseMessage {
            content: None,
            tool_calls: Some(calls),
            ..ResponseMessage::assistant("")
        };
        Self::from_message(message, FinishReason::ToolCalls)
    }

    /// The first choice, which is the only one the agent reads
    pub fn first_choice(&self) -> Result<&Choice> {
        self.choices.first().ok_or(AgentError::EmptyCompletion)
    }

    pub fn into_first_choice(self) -> Result<Choice> {
        self.choices
            .into_iter()
            .next()
            .ok_or(AgentError::EmptyCompletion)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,

    #[serde(default)]
    pub finish_reason: Option<FinishReason>,

    pub message: ResponseMessage,
}

impl Choice {
    /// True when the provider stopped to request at least one tool call
    pub fn requests_tools(&self) -> bool {
        self.finish_reason == Some(FinishReason::ToolCalls)
            && self
                .message
                .tool_calls
                .as_ref()
                .is_some_and(|calls| !calls.is_empty())
    }
}

/// Message returned by the provider
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default = "assistant_role")]
    pub role: Role,

    #[serde(default)]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioOutput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
}

const fn assistant_role() -> Role {
    Role::Assistant
}

impl ResponseMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            audio: None,
            refusal: None,
        }
    }

    /// Render for replay within the same request sequence
    pub fn to_provider_format(&self) -> ProviderMessage {
        ProviderMessage {
            role: self.role,
            content: self.content.clone().map(MessageContent::Text),
            name: None,
            tool_calls: self.tool_calls.clone(),
            tool_call_id: None,
            audio: self.audio.as_ref().map(|audio| AudioReference {
                id: audio.id.clone(),
            }),
        }
    }
}

/// Spoken reply returned in audio mode
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioOutput {
    pub id: String,

    /// Base64 encoded audio in the requested format
    pub data: String,

    #[serde(default)]
    pub transcript: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl AudioOutput {
    /// Decode the audio bytes
    pub fn decode(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| AgentError::Provider(format!("invalid audio payload: {e}")))
    }
}

/// Token usage statistics
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    FunctionCall,
    #[serde(other)]
    Other,
}

/// Interface to a chat completion backend
///
/// The agent works exclusively through this trait. Timeouts and transport
/// failures are the implementation's concern and surface as
/// [`AgentError::Provider`] (or a more specific transport variant).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider identifier used in logs
    fn name(&self) -> &str;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Run one chat completion
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}
