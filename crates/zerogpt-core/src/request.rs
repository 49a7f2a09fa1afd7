//! Request Assembly
//!
//! Turns the prompt, the stored history and the outgoing queue into the
//! ordered message list of a provider request, and shapes the request for
//! the chosen [`ResponseMode`].

use crate::agent::AgentConfig;
use crate::message::{History, Message};
use crate::mode::ResponseMode;
use crate::provider::{
    AudioFormat, AudioOptions, CompletionRequest, JsonSchemaSpec, Modality, ProviderMessage,
    ResponseFormat, ToolDescriptor,
};
use crate::schema::make_strict;

/// Build the message list: system prompt, then history, then the queue.
///
/// The system prompt is always first; history and queue keep their order.
pub fn assemble(prompt: &str, history: &History, outgoing: &[Message]) -> Vec<ProviderMessage> {
    let mut messages = Vec::with_capacity(1 + history.len() + outgoing.len());
    messages.push(Message::system(prompt).to_provider_format());
    messages.extend(history.to_provider_format());
    messages.extend(outgoing.iter().map(Message::to_provider_format));
    messages
}

/// Shape a completion request for one provider round.
pub fn build_request(
    config: &AgentConfig,
    messages: Vec<ProviderMessage>,
    tools: Option<Vec<ToolDescriptor>>,
    mode: &ResponseMode,
) -> CompletionRequest {
    let mut request = CompletionRequest {
        model: config.model.clone(),
        messages,
        tools,
        response_format: None,
        modalities: None,
        audio: None,
        temperature: config.temperature,
    };

    match mode {
        ResponseMode::Plain => {}
        ResponseMode::Structured(format) => {
            request.tools = request.tools.map(into_strict);
            request.response_format = Some(ResponseFormat::JsonSchema {
                json_schema: JsonSchemaSpec {
                    name: format.name.clone(),
                    schema: format.strict_schema(),
                    strict: true,
                },
            });
        }
        ResponseMode::Audio(voice) => {
            request.model.clone_from(&config.audio_model);
            request.modalities = Some(vec![Modality::Text, Modality::Audio]);
            request.audio = Some(AudioOptions {
                voice: *voice,
                format: AudioFormat::Wav,
            });
        }
    }

    request
}

/// Tool schemas sent alongside a structured reply must be strict too.
fn into_strict(tools: Vec<ToolDescriptor>) -> Vec<ToolDescriptor> {
    tools
        .into_iter()
        .map(|mut tool| {
            make_strict(&mut tool.function.parameters);
            tool.function.strict = Some(true);
            tool
        })
        .collect()
}
