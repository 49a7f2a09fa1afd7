//! Chat Agent
//!
//! Implements the completion loop: assemble the request, call the provider,
//! dispatch any requested tools, feed their results back, and repeat until
//! the provider answers without asking for tools.
//!
//! ```text
//! add_message ──▶ queue ──▶ assemble ──▶ provider ──▶ tool calls? ──yes──▶ dispatch ─┐
//!                                           ▲                   │                     │
//!                                           └───────────────────┼─────────────────────┘
//!                                                               no
//!                                                               ▼
//!                                          save turns ──▶ append history ──▶ clear queue
//! ```
//!
//! Tool dispatch is not transactional. If a later step fails, side effects
//! of tools that already ran stay applied, while history, persistence and
//! the outgoing queue are left exactly as they were before the send.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::Settings;
use crate::error::{AgentError, Result};
use crate::message::{History, Message};
use crate::mode::{Reply, ResponseMode, StructuredFormat, Voice};
use crate::provider::{LlmProvider, ResponseMessage};
use crate::request::{assemble, build_request};
use crate::schema;
use crate::store::HistoryStore;
use crate::tool::{Tool, ToolRegistry, TypedTool};

/// Agent configuration
#[derive(Clone, Debug, PartialEq)]
pub struct AgentConfig {
    /// System prompt sent first in every request
    pub system_prompt: String,

    /// Model for text and structured replies
    pub model: String,

    /// Model substituted for spoken replies
    pub audio_model: String,

    /// Maximum tool-call rounds per send before giving up
    pub max_tool_rounds: usize,

    pub temperature: Option<f32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for AgentConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            system_prompt: settings.default_prompt.clone(),
            model: settings.default_model.clone(),
            audio_model: settings.audio_model.clone(),
            max_tool_rounds: settings.max_tool_rounds,
            temperature: settings.temperature,
        }
    }
}

/// A conversational agent bound to at most one user.
///
/// The agent owns its history view, its outgoing queue and a handle to the
/// tool registry. Without a user id nothing is persisted.
pub struct ChatAgent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    store: Option<Arc<dyn HistoryStore>>,
    user_id: Option<String>,
    config: AgentConfig,
    history: History,
    outgoing: Vec<Message>,
}

impl ChatAgent {
    /// Create an agent with an empty, unpersisted history
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            store: None,
            user_id: None,
            config,
            history: History::new(),
            outgoing: Vec::new(),
        }
    }

    /// Create an agent for a user, hydrating history from the store
    pub fn for_user(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn HistoryStore>,
        user_id: impl Into<String>,
        config: AgentConfig,
    ) -> Result<Self> {
        let user_id = user_id.into();
        let history = store.load(&user_id)?;
        tracing::debug!(user = %user_id, messages = history.len(), "Loaded history");

        Ok(Self {
            provider,
            tools,
            store: Some(store),
            user_id: Some(user_id),
            config,
            history,
            outgoing: Vec::new(),
        })
    }

    /// Queue a message for the next send
    pub fn add_message(&mut self, message: Message) {
        self.outgoing.push(message);
    }

    /// Queue one message and send, returning the reply text
    pub async fn send_message(&mut self, message: impl Into<Message>) -> Result<String> {
        self.add_message(message.into());
        self.send_messages_text(Vec::new()).await
    }

    /// Queue one message and send, parsing the reply into `T`
    pub async fn send_message_structured<T>(&mut self, message: impl Into<Message>) -> Result<T>
    where
        T: DeserializeOwned + JsonSchema,
    {
        self.add_message(message.into());
        self.send_messages_structured(Vec::new()).await
    }

    /// Send the queue (plus `extra`) and resolve the full loop in `mode`
    pub async fn send_messages(
        &mut self,
        mode: ResponseMode,
        extra: Vec<Message>,
    ) -> Result<Reply> {
        match &mode {
            ResponseMode::Plain => self.run(&mode, extra, plain_text).await.map(Reply::Text),
            ResponseMode::Structured(format) => self
                .run(&mode, extra, |message| parse_structured(message, format))
                .await
                .map(Reply::Structured),
            ResponseMode::Audio(_) => self
                .run(&mode, extra, require_audio)
                .await
                .map(Reply::Audio),
        }
    }

    /// Send and return the reply text
    pub async fn send_messages_text(&mut self, extra: Vec<Message>) -> Result<String> {
        self.run(&ResponseMode::Plain, extra, plain_text).await
    }

    /// Send with the reply constrained to `T`'s schema and parsed into it
    pub async fn send_messages_structured<T>(&mut self, extra: Vec<Message>) -> Result<T>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let format = StructuredFormat::for_type::<T>();
        let mode = ResponseMode::Structured(format.clone());
        self.run(&mode, extra, |message| parse_structured::<T>(message, &format))
            .await
    }

    /// Send asking for a spoken reply; returns the raw provider message
    /// carrying transcript and audio
    pub async fn send_messages_audio_response(
        &mut self,
        extra: Vec<Message>,
        voice: Voice,
    ) -> Result<ResponseMessage> {
        self.run(&ResponseMode::Audio(voice), extra, require_audio)
            .await
    }

    /// Get the conversation history
    pub const fn history(&self) -> &History {
        &self.history
    }

    /// Messages queued for the next send
    pub fn pending(&self) -> &[Message] {
        &self.outgoing
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Drive one send: resolve, interpret the final message, then record.
    ///
    /// `interpret` runs before any bookkeeping so a parse failure leaves the
    /// agent untouched.
    async fn run<R>(
        &mut self,
        mode: &ResponseMode,
        extra: Vec<Message>,
        interpret: impl FnOnce(&ResponseMessage) -> Result<R> + Send,
    ) -> Result<R> {
        self.outgoing.extend(extra);

        let (message, rounds) = self.resolve(mode).await?;
        let value = interpret(&message)?;
        self.record(agent_turn(&message))?;

        tracing::info!(
            user = self.user_id.as_deref().unwrap_or("-"),
            rounds,
            history = self.history.len(),
            "Send resolved"
        );
        Ok(value)
    }

    /// Call the provider until it stops asking for tools.
    ///
    /// Returns the final message and the number of tool rounds it took.
    async fn resolve(&self, mode: &ResponseMode) -> Result<(ResponseMessage, usize)> {
        let messages = assemble(&self.config.system_prompt, &self.history, &self.outgoing);
        let mut request = build_request(&self.config, messages, self.tools.describe_all(), mode);
        let mut rounds = 0;

        loop {
            tracing::debug!(
                provider = self.provider.name(),
                model = %request.model,
                round = rounds,
                messages = request.messages.len(),
                "Calling provider"
            );
            let choice = self.provider.complete(&request).await?.into_first_choice()?;

            if !choice.requests_tools() {
                return Ok((choice.message, rounds));
            }

            rounds += 1;
            if rounds > self.config.max_tool_rounds {
                return Err(AgentError::RoundLimitExceeded(self.config.max_tool_rounds));
            }

            let calls = choice.message.tool_calls.clone().unwrap_or_default();
            if let Some(call) = calls.iter().find(|call| call.id.is_empty()) {
                return Err(AgentError::MissingToolCallId(call.name().to_owned()));
            }

            request.messages.push(choice.message.to_provider_format());
            for call in &calls {
                let result = self.tools.dispatch(call).await?;
                let mut rendered = result.to_provider_format();
                rendered.tool_call_id = Some(call.id.clone());
                request.messages.push(rendered);
            }
        }
    }

    /// Persist and append the queued turns plus the agent turn, then clear
    /// the queue. Nothing changes in memory unless the save succeeds.
    fn record(&mut self, agent_message: Message) -> Result<()> {
        let mut turns: Vec<Message> = self
            .outgoing
            .iter()
            .filter(|message| message.include_in_history)
            .cloned()
            .collect();
        turns.push(agent_message);

        if let (Some(store), Some(user_id)) = (&self.store, &self.user_id) {
            store.save(user_id, &turns)?;
        }

        for turn in turns {
            self.history.add_message(turn);
        }
        self.outgoing.clear();
        Ok(())
    }
}

fn plain_text(message: &ResponseMessage) -> Result<String> {
    Ok(message.content.clone().unwrap_or_default())
}

/// Parse a structured reply and check it against the schema it was asked for.
fn parse_structured<T: DeserializeOwned>(
    message: &ResponseMessage,
    format: &StructuredFormat,
) -> Result<T> {
    let content = message
        .content
        .as_deref()
        .ok_or_else(|| AgentError::ResponseParse("response has no content".into()))?;
    let mut value: Value =
        serde_json::from_str(content).map_err(|e| AgentError::ResponseParse(e.to_string()))?;

    schema::validate(&format.strict_schema(), &value).map_err(|reason| {
        AgentError::ResponseParse(format!("reply does not match '{}': {reason}", format.name))
    })?;
    schema::drop_optional_nulls(&format.schema, &mut value);

    serde_json::from_value(value).map_err(|e| AgentError::ResponseParse(e.to_string()))
}

fn require_audio(message: &ResponseMessage) -> Result<ResponseMessage> {
    if message.audio.is_none() {
        return Err(AgentError::MissingAudioPayload);
    }
    Ok(message.clone())
}

/// History turn for the final reply; spoken replies fall back to their
/// transcript since they usually carry no text content.
fn agent_turn(message: &ResponseMessage) -> Message {
    let mut turn = Message::from_provider_response(message);
    if turn.content.is_empty() {
        if let Some(audio) = &message.audio {
            turn.content.clone_from(&audio.transcript);
        }
    }
    turn
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: Arc<ToolRegistry>,
    store: Option<Arc<dyn HistoryStore>>,
    user_id: Option<String>,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: Arc::new(ToolRegistry::new()),
            store: None,
            user_id: None,
            config: AgentConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn settings(mut self, settings: &Settings) -> Self {
        self.config = AgentConfig::from(settings);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        Arc::make_mut(&mut self.tools).register(tool);
        self
    }

    pub fn typed_tool<T: TypedTool>(mut self, tool: T) -> Self {
        Arc::make_mut(&mut self.tools).register_typed(tool);
        self
    }

    /// Share an existing registry
    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn audio_model(mut self, model: impl Into<String>) -> Self {
        self.config.audio_model = model.into();
        self
    }

    pub const fn temperature(mut self, temp: f32) -> Self {
        self.config.temperature = Some(temp);
        self
    }

    pub const fn max_tool_rounds(mut self, max: usize) -> Self {
        self.config.max_tool_rounds = max;
        self
    }

    pub fn build(self) -> Result<ChatAgent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        match (self.store, self.user_id) {
            (Some(store), Some(user_id)) => {
                ChatAgent::for_user(provider, self.tools, store, user_id, self.config)
            }
            (None, Some(_)) => Err(AgentError::Config(
                "A history store is required when a user id is set".into(),
            )),
            _ => Ok(ChatAgent::new(provider, self.tools, self.config)),
        }
    }
}
