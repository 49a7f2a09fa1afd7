//! # zerogpt-runtime
//!
//! Runtime providers for the zerogpt agent.
//!
//! ## Providers
//!
//! - **OpenAI** (default): the Chat Completions API, or any server exposing
//!   the same wire format (Ollama's `/v1`, vLLM, LiteLLM)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zerogpt_runtime::openai::OpenAiProvider;
//!
//! let provider = OpenAiProvider::from_env()?;
//! let agent = AgentBuilder::new()
//!     .provider(Arc::new(provider))
//!     .build()?;
//! ```

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "openai")]
pub use openai::{OpenAiConfig, OpenAiProvider};

// Re-export core types for convenience
pub use zerogpt_core::{
    AgentBuilder, AgentError, ChatAgent, LlmProvider, Message, Result, Role, Tool, ToolRegistry,
};
