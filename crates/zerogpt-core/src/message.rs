//! Conversation Messages
//!
//! Standard message format used across the agent system, plus the
//! append-only [`History`] a conversation accumulates.

use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::provider::{
    AudioFormat, ContentPart, MessageContent, ProviderMessage, ResponseMessage,
};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (injected as context)
    Tool,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            other => Err(AgentError::Other(format!("unknown role: {other}"))),
        }
    }
}

/// Participant name attached to a message.
///
/// Providers use it to tell apart several speakers sharing one role, and
/// reject names containing whitespace, so a `Name` can only be built from a
/// string without any.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name(String);

impl Name {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.chars().any(char::is_whitespace) {
            return Err(AgentError::InvalidName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Name {
    type Error = AgentError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.0
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Image attached to a message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageData {
    /// Publicly reachable URL (or a prebuilt data URL)
    Url(String),
    /// Base64 encoded image bytes
    Base64 { data: String, mime_type: String },
}

impl ImageData {
    /// Render as the URL a provider expects in an `image_url` part
    pub fn to_url(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Base64 { data, mime_type } => format!("data:{mime_type};base64,{data}"),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content (may be empty when the message only carries audio)
    pub content: String,

    /// Optional name (for multi-user scenarios)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Name>,

    /// Optional image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageData>,

    /// Optional base64 encoded wav clip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,

    /// Whether this turn is persisted and replayed
    #[serde(default = "default_include")]
    pub include_in_history: bool,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

const fn default_include() -> bool {
    true
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            image: None,
            audio: None,
            include_in_history: true,
            created_at: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool result message
    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// Add a name to the message
    pub fn with_name(mut self, name: impl Into<String>) -> Result<Self> {
        self.name = Some(Name::new(name)?);
        Ok(self)
    }

    pub fn with_image(mut self, image: ImageData) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_image_url(self, url: impl Into<String>) -> Self {
        self.with_image(ImageData::Url(url.into()))
    }

    /// Attach base64 encoded JPEG data
    pub fn with_image_base64(self, data: impl Into<String>) -> Self {
        self.with_image(ImageData::Base64 {
            data: data.into(),
            mime_type: "image/jpeg".into(),
        })
    }

    pub fn with_image_bytes(self, bytes: &[u8], mime_type: impl Into<String>) -> Self {
        self.with_image(ImageData::Base64 {
            data: STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        })
    }

    /// Attach base64 encoded wav data
    pub fn with_audio_base64(mut self, data: impl Into<String>) -> Self {
        self.audio = Some(data.into());
        self
    }

    /// Attach raw wav bytes
    pub fn with_audio_bytes(self, wav: &[u8]) -> Self {
        self.with_audio_base64(STANDARD.encode(wav))
    }

    /// Keep this message out of the persisted history
    #[must_use]
    pub fn excluded_from_history(mut self) -> Self {
        self.include_in_history = false;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    const fn is_multimodal(&self) -> bool {
        self.image.is_some() || self.audio.is_some()
    }

    /// Render the message in the provider's chat format.
    ///
    /// Plain text messages render their content as a string. Messages with an
    /// image or audio render a list of typed parts; an empty text part is
    /// left out when audio is present since providers reject it.
    pub fn to_provider_format(&self) -> ProviderMessage {
        let content = if self.is_multimodal() {
            let mut parts = Vec::with_capacity(3);
            if !(self.content.is_empty() && self.audio.is_some()) {
                parts.push(ContentPart::text(&self.content));
            }
            if let Some(image) = &self.image {
                parts.push(ContentPart::image_url(image.to_url()));
            }
            if let Some(audio) = &self.audio {
                parts.push(ContentPart::input_audio(audio, AudioFormat::Wav));
            }
            MessageContent::Parts(parts)
        } else {
            MessageContent::Text(self.content.clone())
        };

        let mut message = ProviderMessage::new(self.role, content);
        message.name = self.name.as_ref().map(|n| n.as_str().to_owned());
        message
    }

    /// Build a message from a provider response, keeping role and text only
    pub fn from_provider_response(response: &ResponseMessage) -> Self {
        Self::new(response.role, response.content.clone().unwrap_or_default())
    }
}

impl From<&str> for Message {
    fn from(content: &str) -> Self {
        Self::user(content)
    }
}

impl From<String> for Message {
    fn from(content: String) -> Self {
        Self::user(content)
    }
}

/// Ordered, append-only conversation history (oldest first)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Append a message
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Render every message, preserving order
    pub fn to_provider_format(&self) -> Vec<ProviderMessage> {
        self.messages.iter().map(Message::to_provider_format).collect()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
