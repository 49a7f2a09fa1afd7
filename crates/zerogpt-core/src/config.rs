//! Configuration
//!
//! Settings are an explicit value handed to each agent, so several
//! differently configured agents can live in one process.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{AgentError, Result};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_AUDIO_MODEL: &str = "gpt-4o-audio-preview";
pub const DEFAULT_PROMPT: &str = "You are a helpful assistant.";
pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;
pub const DEFAULT_DB_PATH: &str = "./chat_history.sqlite";

/// Process-level settings
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Model used for text and structured replies
    pub default_model: String,

    /// Model substituted for spoken replies
    pub audio_model: String,

    /// System prompt sent first in every request
    pub default_prompt: String,

    /// Number of most recent messages loaded per user
    pub message_history_limit: usize,

    /// Location of the history database
    pub db_path: PathBuf,

    /// Tool-call rounds allowed within one send
    pub max_tool_rounds: usize,

    pub temperature: Option<f32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.into(),
            audio_model: DEFAULT_AUDIO_MODEL.into(),
            default_prompt: DEFAULT_PROMPT.into(),
            message_history_limit: DEFAULT_HISTORY_LIMIT,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            temperature: None,
        }
    }
}

impl Settings {
    /// Defaults overlaid with `ZEROGPT_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns per variable name
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(model) = lookup("ZEROGPT_MODEL") {
            settings.default_model = model;
        }
        if let Some(model) = lookup("ZEROGPT_AUDIO_MODEL") {
            settings.audio_model = model;
        }
        if let Some(prompt) = lookup("ZEROGPT_PROMPT") {
            settings.default_prompt = prompt;
        }
        if let Some(path) = lookup("ZEROGPT_DB_PATH") {
            settings.db_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup("ZEROGPT_HISTORY_LIMIT") {
            settings.message_history_limit = parse_var("ZEROGPT_HISTORY_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("ZEROGPT_MAX_TOOL_ROUNDS") {
            settings.max_tool_rounds = parse_var("ZEROGPT_MAX_TOOL_ROUNDS", &raw)?;
        }
        if let Some(raw) = lookup("ZEROGPT_TEMPERATURE") {
            settings.temperature = Some(parse_var("ZEROGPT_TEMPERATURE", &raw)?);
        }

        Ok(settings)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| AgentError::Config(format!("{key}={raw:?}: {e}")))
}
