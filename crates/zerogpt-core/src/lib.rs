//! # zerogpt-core
//!
//! Conversational agent core: message history, tool registry and dispatch,
//! request assembly and the completion loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          ChatAgent                           │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────┐  │
//! │  │ Completion  │  │    Tool     │  │     LlmProvider      │  │
//! │  │    Loop     │──│  Registry   │──│     (Strategy)       │  │
//! │  └─────────────┘  └─────────────┘  └──────────────────────┘  │
//! │         │                                                    │
//! │  ┌─────────────┐  ┌─────────────┐                            │
//! │  │   History   │──│HistoryStore │                            │
//! │  └─────────────┘  └─────────────┘                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait keeps the loop independent of the backend, and
//! `HistoryStore` keeps it independent of where turns are persisted.

pub mod agent;
pub mod config;
pub mod error;
pub mod message;
pub mod mock;
pub mod mode;
pub mod provider;
pub mod request;
pub mod schema;
pub mod store;
pub mod tool;

pub use agent::{AgentBuilder, AgentConfig, ChatAgent};
pub use config::Settings;
pub use error::{AgentError, Result};
pub use message::{History, ImageData, Message, Name, Role};
pub use mode::{Reply, ResponseMode, StructuredFormat, Voice};
pub use provider::{
    Completion, CompletionRequest, FinishReason, LlmProvider, ResponseMessage, ToolCallRequest,
};
pub use store::{HistoryStore, MemoryHistoryStore};
pub use tool::{DateTimeTool, Tool, ToolOutput, ToolRegistry, ToolSchema, Typed, TypedTool};
