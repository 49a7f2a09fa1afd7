//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
///
/// Nothing in the core retries. Every variant reaches the caller of the
/// outermost `send_*` call, and tool side effects that already ran before a
/// failure stay applied.
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error (transport or API failure)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider returned a completion without any choices
    #[error("Provider returned no choices")]
    EmptyCompletion,

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool arguments were malformed or did not match the input schema
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    ArgumentValidation { tool: String, reason: String },

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Tool call from the provider carried no correlation id
    #[error("Tool call for '{0}' is missing its call id")]
    MissingToolCallId(String),

    /// Too many tool-call rounds within a single send
    #[error("Tool-call round limit ({0}) exceeded")]
    RoundLimitExceeded(usize),

    /// Structured reply did not parse against the requested schema
    #[error("Could not parse structured response: {0}")]
    ResponseParse(String),

    /// Audio reply requested but the provider returned none
    #[error("Expected an audio payload but the response had none")]
    MissingAudioPayload,

    /// Message name contains whitespace
    #[error("Invalid message name '{0}': names may not contain whitespace")]
    InvalidName(String),

    /// Persistence adapter failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    ///
    /// Only transport-level conditions qualify. Retrying is left to the
    /// caller, who must account for the outgoing queue being resent.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::RateLimited(_) | Self::Io(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) | Self::EmptyCompletion => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::ToolNotFound(name) => format!("The tool '{name}' is not available."),
            Self::ArgumentValidation { tool, .. } => {
                format!("The AI sent invalid input to the tool '{tool}'.")
            }
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            Self::RoundLimitExceeded(_) => {
                "The request took too long to process. Please try a simpler query.".into()
            }
            Self::ResponseParse(_) => "The AI response could not be understood.".into(),
            Self::MissingAudioPayload => "The AI did not return any audio.".into(),
            Self::InvalidName(name) => format!("'{name}' is not a valid participant name."),
            Self::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            Self::Auth(_) => "Authentication failed. Please check your credentials.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
