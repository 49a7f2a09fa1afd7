use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use zerogpt_core::mode::Voice;
use zerogpt_core::provider::{CompletionRequest, FinishReason, LlmProvider};
use zerogpt_core::{AgentBuilder, AgentError, DateTimeTool, Message};
use zerogpt_runtime::{OpenAiConfig, OpenAiProvider};

fn provider_for(server: &MockServer) -> OpenAiProvider {
    OpenAiProvider::from_config(OpenAiConfig::new("test-key").with_base_url(server.uri())).unwrap()
}

fn text_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1_677_652_288,
        "model": "gpt-4o-mini-2024-07-18",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21}
    })
}

fn request(messages: Vec<Message>) -> CompletionRequest {
    CompletionRequest {
        model: "gpt-4o-mini".into(),
        messages: messages.iter().map(Message::to_provider_format).collect(),
        tools: None,
        response_format: None,
        modalities: None,
        audio: None,
        temperature: None,
    }
}

#[tokio::test]
async fn test_openai_completion() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "Hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_body("Hello there!")))
        .expect(1)
        .mount(&server)
        .await;

    let completion = provider_for(&server)
        .complete(&request(vec![Message::user("Hello")]))
        .await
        .unwrap();

    let choice = completion.first_choice().unwrap();
    assert_eq!(choice.message.content.as_deref(), Some("Hello there!"));
    assert_eq!(choice.finish_reason, Some(FinishReason::Stop));
    assert_eq!(completion.usage.unwrap().total_tokens, 21);
}

#[tokio::test]
async fn test_openai_tool_call_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-456",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc123",
                        "type": "function",
                        "function": {"name": "datetime", "arguments": "{\"format\":\"iso\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .mount(&server)
        .await;

    let completion = provider_for(&server)
        .complete(&request(vec![Message::user("What time is it?")]))
        .await
        .unwrap();

    let choice = completion.into_first_choice().unwrap();
    assert!(choice.requests_tools());
    let calls = choice.message.tool_calls.unwrap();
    assert_eq!(calls[0].id, "call_abc123");
    assert_eq!(calls[0].name(), "datetime");
}

#[tokio::test]
async fn test_openai_error_statuses() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Rate limit reached", "type": "requests"}
        })))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .complete(&request(vec![Message::user("Hello")]))
        .await
        .unwrap_err();

    assert!(matches!(&err, AgentError::RateLimited(m) if m.contains("Rate limit reached")));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_openai_health_check() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    assert!(provider_for(&server).health_check().await.unwrap());

    let unreachable = OpenAiProvider::from_config(
        OpenAiConfig::new("test-key").with_base_url("http://127.0.0.1:1"),
    )
    .unwrap();
    assert!(!unreachable.health_check().await.unwrap());
}

#[tokio::test]
async fn test_agent_tool_round_over_http() {
    let server = MockServer::start().await;

    // Second round: the request carries the tool result for call_1
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [{}, {}, {}, {"role": "tool", "tool_call_id": "call_1"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_body("It is late.")))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "datetime", "arguments": "{}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .with_priority(2)
        .expect(1)
        .mount(&server)
        .await;

    let mut agent = AgentBuilder::new()
        .provider(Arc::new(provider_for(&server)))
        .typed_tool(DateTimeTool)
        .build()
        .unwrap();

    let reply = agent.send_message("What time is it?").await.unwrap();
    assert_eq!(reply, "It is late.");
    assert_eq!(agent.history().len(), 2);
}

#[tokio::test]
async fn test_audio_request_shape() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-audio-preview",
            "modalities": ["text", "audio"],
            "audio": {"voice": "coral", "format": "wav"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4o-audio-preview",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "audio": {
                        "id": "audio_1",
                        "data": "UklGRg==",
                        "transcript": "Hello from the speaker.",
                        "expires_at": 1_729_000_000
                    }
                },
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut agent = AgentBuilder::new()
        .provider(Arc::new(provider_for(&server)))
        .build()
        .unwrap();

    let reply = agent
        .send_messages_audio_response(vec![Message::user("Say hello")], Voice::Coral)
        .await
        .unwrap();

    let audio = reply.audio.unwrap();
    assert_eq!(audio.decode().unwrap(), b"RIFF");
    assert_eq!(agent.history().last().unwrap().content, "Hello from the speaker.");
}
