//! Tool System
//!
//! Extensible tool framework for agent capabilities.
//! Tools are registered at runtime and dispatched by the completion loop
//! whenever the provider asks for them by name.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{ToolCallRequest, ToolDescriptor};
use crate::schema::{drop_optional_nulls, schema_for, validate as validate_schema};

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    #[serde(default)]
    pub description: Option<String>,

    /// JSON schema of the arguments object
    pub parameters: Value,
}

impl ToolSchema {
    pub fn to_descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::function(
            self.name.clone(),
            self.description.clone(),
            self.parameters.clone(),
        )
    }
}

/// What a tool hands back: bare text or a full message
#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Message(Message),
}

impl ToolOutput {
    /// Normalize into a message, wrapping bare text in a `tool` role message
    pub fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::tool(text),
            Self::Message(message) => message,
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Message> for ToolOutput {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for LLM function calling
    fn schema(&self) -> ToolSchema;

    /// Validate arguments before execution
    ///
    /// The default checks the arguments against the parameter schema.
    fn validate(&self, arguments: &Value) -> Result<()> {
        let schema = self.schema();
        let invalid = |reason: String| AgentError::ArgumentValidation {
            tool: schema.name.clone(),
            reason,
        };

        if !arguments.is_object() {
            return Err(invalid("arguments must be a JSON object".into()));
        }
        validate_schema(&schema.parameters, arguments).map_err(invalid)
    }

    /// Execute the tool with validated arguments
    async fn execute(&self, arguments: Value) -> Result<ToolOutput>;
}

/// A tool whose input is a Rust type.
///
/// The argument schema is generated from `Input`, and validation is
/// deserialization into it. Register with [`ToolRegistry::register_typed`].
#[async_trait]
pub trait TypedTool: Send + Sync + 'static {
    type Input: DeserializeOwned + JsonSchema + Send + 'static;

    fn name(&self) -> &str;

    /// Falls back to the input type's doc comment when `None`
    fn description(&self) -> Option<&str> {
        None
    }

    async fn run(&self, input: Self::Input) -> Result<ToolOutput>;
}

/// Adapter exposing a [`TypedTool`] through the [`Tool`] trait
pub struct Typed<T>(pub T);

impl<T: TypedTool> Typed<T> {
    fn parse(&self, arguments: Value) -> Result<T::Input> {
        serde_json::from_value(arguments).map_err(|e| AgentError::ArgumentValidation {
            tool: self.0.name().to_owned(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl<T: TypedTool> Tool for Typed<T> {
    fn schema(&self) -> ToolSchema {
        let parameters = schema_for::<T::Input>();
        let description = self.0.description().map(str::to_owned).or_else(|| {
            parameters
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_owned)
        });
        ToolSchema {
            name: self.0.name().to_owned(),
            description,
            parameters,
        }
    }

    fn validate(&self, arguments: &Value) -> Result<()> {
        self.parse(arguments.clone()).map(drop)
    }

    async fn execute(&self, arguments: Value) -> Result<ToolOutput> {
        let input = self.parse(arguments)?;
        self.0.run(input).await
    }
}

/// Registry for available tools
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a new tool
    ///
    /// Names are unique: registering a second tool under the same name
    /// replaces the first.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a typed tool
    pub fn register_typed<T: TypedTool>(&mut self, tool: T) {
        self.register(Typed(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.schema().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Replacing previously registered tool");
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Look up a tool by exact name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_owned()))
    }

    /// Describe every tool for a provider request, sorted by name.
    ///
    /// Returns `None` rather than an empty list when nothing is registered.
    pub fn describe_all(&self) -> Option<Vec<ToolDescriptor>> {
        if self.tools.is_empty() {
            return None;
        }
        let mut descriptors: Vec<_> = self
            .tools
            .values()
            .map(|tool| tool.schema().to_descriptor())
            .collect();
        descriptors.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        Some(descriptors)
    }

    /// Resolve, validate and run one provider tool call.
    ///
    /// Bare text results come back as `tool` role messages. Errors raised by
    /// the tool itself propagate untouched.
    pub async fn dispatch(&self, call: &ToolCallRequest) -> Result<Message> {
        let name = call.name();
        let tool = self.resolve(name)?;
        let mut arguments = parse_arguments(call)?;

        // Strict callers send null for optional parameters they leave out
        drop_optional_nulls(&tool.schema().parameters, &mut arguments);
        tool.validate(&arguments)?;

        tracing::debug!(tool = %name, call_id = %call.id, "Executing tool");
        let message = tool.execute(arguments).await?.into_message();
        tracing::debug!(tool = %name, bytes = message.content.len(), "Tool finished");

        Ok(message)
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Blank argument strings are read as an empty object.
fn parse_arguments(call: &ToolCallRequest) -> Result<Value> {
    let raw = call.function.arguments.trim();
    if raw.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| AgentError::ArgumentValidation {
        tool: call.name().to_owned(),
        reason: format!("malformed JSON: {e}"),
    })
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// Output format of the `datetime` tool
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TimeFormat {
    Iso,
    #[default]
    Human,
    Unix,
}

/// Get the current date and time
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct DateTimeInput {
    /// Output format: 'iso', 'human', or 'unix'
    #[serde(default)]
    pub format: TimeFormat,
}

/// DateTime tool - returns current time (UTC)
pub struct DateTimeTool;

#[async_trait]
impl TypedTool for DateTimeTool {
    type Input = DateTimeInput;

    fn name(&self) -> &str {
        "datetime"
    }

    async fn run(&self, input: DateTimeInput) -> Result<ToolOutput> {
        let now = chrono::Utc::now();

        let output = match input.format {
            TimeFormat::Iso => now.to_rfc3339(),
            TimeFormat::Unix => now.timestamp().to_string(),
            TimeFormat::Human => now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string(),
        };

        Ok(output.into())
    }
}
