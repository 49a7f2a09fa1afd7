//! Response Modes
//!
//! Each send picks exactly one reply shape up front: free text, a
//! schema-constrained JSON object, or a spoken reply. The mode is an
//! argument of the send rather than agent state, so it can never leak
//! into the next call.

use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::provider::ResponseMessage;
use crate::schema::{make_strict, schema_for, schema_title};

/// Voice used for spoken replies
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
    Ash,
    Ballad,
    Coral,
    Sage,
    Verse,
}

impl Voice {
    pub const ALL: [Self; 11] = [
        Self::Alloy,
        Self::Echo,
        Self::Fable,
        Self::Onyx,
        Self::Nova,
        Self::Shimmer,
        Self::Ash,
        Self::Ballad,
        Self::Coral,
        Self::Sage,
        Self::Verse,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Echo => "echo",
            Self::Fable => "fable",
            Self::Onyx => "onyx",
            Self::Nova => "nova",
            Self::Shimmer => "shimmer",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Sage => "sage",
            Self::Verse => "verse",
        }
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|voice| voice.as_str() == lowered)
            .ok_or_else(|| AgentError::Config(format!("unknown voice: {s}")))
    }
}

/// Schema a structured reply must satisfy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructuredFormat {
    /// Schema name reported to the provider
    pub name: String,

    /// JSON schema of the expected object
    pub schema: serde_json::Value,
}

impl StructuredFormat {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// Derive the format from a Rust type
    pub fn for_type<T: JsonSchema>() -> Self {
        let schema = schema_for::<T>();
        let name = schema_title(&schema).unwrap_or("response").to_owned();
        Self { name, schema }
    }

    /// The schema rewritten for strict mode: closed objects, every property
    /// required, optional ones nullable
    pub fn strict_schema(&self) -> serde_json::Value {
        let mut schema = self.schema.clone();
        make_strict(&mut schema);
        schema
    }
}

/// Reply shape requested for one send
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ResponseMode {
    /// Free text
    #[default]
    Plain,
    /// JSON object constrained to a schema
    Structured(StructuredFormat),
    /// Spoken reply with a transcript
    Audio(Voice),
}

/// Resolved result of a send
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// Text content of the final message
    Text(String),
    /// Parsed JSON object of a structured reply
    Structured(serde_json::Value),
    /// Final provider message, carrying the audio payload
    Audio(ResponseMessage),
}

impl Reply {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_structured(self) -> Option<serde_json::Value> {
        match self {
            Self::Structured(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_audio(self) -> Option<ResponseMessage> {
        match self {
            Self::Audio(message) => Some(message),
            _ => None,
        }
    }
}
