use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use zerogpt_core::mock::MockProvider;
use zerogpt_core::provider::{AudioOutput, ResponseFormat, ResponseMessage};
use zerogpt_core::{
    AgentBuilder, AgentError, Completion, FinishReason, HistoryStore, MemoryHistoryStore, Message,
    Reply, ResponseMode, Role, StructuredFormat, ToolCallRequest, ToolOutput, TypedTool, Voice,
};

#[derive(Deserialize, JsonSchema)]
struct AddInput {
    a: i64,
    b: i64,
}

/// Adds two integers and counts its invocations.
#[derive(Default)]
struct AddTool {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl TypedTool for AddTool {
    type Input = AddInput;

    fn name(&self) -> &str {
        "add"
    }

    fn description(&self) -> Option<&str> {
        Some("Add two integers")
    }

    async fn run(&self, input: AddInput) -> zerogpt_core::Result<ToolOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((input.a + input.b).to_string().into())
    }
}

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
struct Answer {
    value: i64,
}

fn add_call(id: &str) -> Completion {
    Completion::from_tool_calls(vec![ToolCallRequest::new(id, "add", r#"{"a":2,"b":3}"#)])
}

fn audio_reply(transcript: &str) -> Completion {
    let message = ResponseMessage {
        content: None,
        audio: Some(AudioOutput {
            id: "audio_abc".into(),
            data: "UklGRg==".into(),
            transcript: transcript.into(),
            expires_at: Some(1_700_000_000),
        }),
        ..ResponseMessage::assistant("")
    };
    Completion::from_message(message, FinishReason::Stop)
}

#[tokio::test]
async fn plain_reply_is_returned_unmodified() {
    let provider = Arc::new(MockProvider::new(vec![Completion::from_text(
        "  Hello there.\n",
    )]));
    let mut agent = AgentBuilder::new()
        .provider(provider.clone())
        .system_prompt("Be brief.")
        .build()
        .unwrap();

    let reply = agent.send_message("Hi").await.unwrap();
    assert_eq!(reply, "  Hello there.\n");

    let requests = provider.requests().await;
    assert_eq!(requests.len(), 1);
    let messages = &requests[0].messages;
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[0].text(), "Be brief.");
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[1].text(), "Hi");
    assert!(requests[0].tools.is_none());
}

#[tokio::test]
async fn history_grows_with_each_send() {
    let provider = Arc::new(MockProvider::new(vec![
        Completion::from_text("first"),
        Completion::from_text("second"),
    ]));
    let mut agent = AgentBuilder::new().provider(provider.clone()).build().unwrap();

    agent.send_message("one").await.unwrap();
    agent.send_message("two").await.unwrap();

    let contents: Vec<_> = agent.history().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["one", "first", "two", "second"]);

    // Second request carries the first exchange between prompt and queue
    let requests = provider.requests().await;
    let texts: Vec<_> = requests[1].messages.iter().map(|m| m.text()).collect();
    assert_eq!(texts[1..], ["one", "first", "two"]);
}

#[tokio::test]
async fn excluded_messages_are_sent_but_not_kept() {
    let provider = Arc::new(MockProvider::new(vec![Completion::from_text("noted")]));
    let mut agent = AgentBuilder::new().provider(provider.clone()).build().unwrap();

    agent.add_message(Message::user("context only").excluded_from_history());
    agent.add_message(Message::user("keep me"));
    agent.send_messages_text(Vec::new()).await.unwrap();

    let requests = provider.requests().await;
    assert_eq!(requests[0].messages.len(), 3);

    let contents: Vec<_> = agent.history().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["keep me", "noted"]);
    assert!(agent.pending().is_empty());
}

#[tokio::test]
async fn tool_round_feeds_result_back() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = Arc::new(MockProvider::new(vec![
        add_call("call_1"),
        Completion::from_text("The sum is 5."),
    ]));
    let mut agent = AgentBuilder::new()
        .provider(provider.clone())
        .typed_tool(AddTool {
            calls: calls.clone(),
        })
        .build()
        .unwrap();

    let reply = agent.send_message("What is 2 + 3?").await.unwrap();
    assert_eq!(reply, "The sum is 5.");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let requests = provider.requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(1));

    let follow_up = &requests[1].messages;
    let assistant = &follow_up[follow_up.len() - 2];
    assert_eq!(assistant.role, Role::Assistant);
    assert_eq!(assistant.tool_calls.as_ref().map(Vec::len), Some(1));

    let result = follow_up.last().unwrap();
    assert_eq!(result.role, Role::Tool);
    assert_eq!(result.tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(result.text(), "5");

    // Intermediate tool traffic stays out of history
    assert_eq!(agent.history().len(), 2);
}

#[tokio::test]
async fn several_calls_in_one_round_run_in_order() {
    let provider = Arc::new(MockProvider::new(vec![
        Completion::from_tool_calls(vec![
            ToolCallRequest::new("call_a", "add", r#"{"a":1,"b":1}"#),
            ToolCallRequest::new("call_b", "add", r#"{"a":5,"b":5}"#),
        ]),
        Completion::from_text("2 and 10"),
    ]));
    let mut agent = AgentBuilder::new()
        .provider(provider.clone())
        .typed_tool(AddTool::default())
        .build()
        .unwrap();

    agent.send_message("sums").await.unwrap();

    let requests = provider.requests().await;
    let results: Vec<_> = requests[1]
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| (m.tool_call_id.clone().unwrap(), m.text()))
        .collect();
    assert_eq!(
        results,
        [("call_a".to_owned(), "2".to_owned()), ("call_b".to_owned(), "10".to_owned())]
    );
}

#[tokio::test]
async fn unknown_tool_fails_without_second_call() {
    let provider = Arc::new(MockProvider::new(vec![
        Completion::from_tool_calls(vec![ToolCallRequest::new("call_1", "missing", "{}")]),
        Completion::from_text("unreachable"),
    ]));
    let mut agent = AgentBuilder::new().provider(provider.clone()).build().unwrap();

    let err = agent.send_message("go").await.unwrap_err();
    assert!(matches!(err, AgentError::ToolNotFound(name) if name == "missing"));
    assert_eq!(provider.call_count().await, 1);
}

#[tokio::test]
async fn invalid_arguments_are_rejected() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = Arc::new(MockProvider::new(vec![Completion::from_tool_calls(vec![
        ToolCallRequest::new("call_1", "add", r#"{"a":"two"}"#),
    ])]));
    let mut agent = AgentBuilder::new()
        .provider(provider)
        .typed_tool(AddTool {
            calls: calls.clone(),
        })
        .build()
        .unwrap();

    let err = agent.send_message("go").await.unwrap_err();
    assert!(matches!(err, AgentError::ArgumentValidation { tool, .. } if tool == "add"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_call_id_is_an_error() {
    let provider = Arc::new(MockProvider::new(vec![Completion::from_tool_calls(vec![
        ToolCallRequest::new("", "add", r#"{"a":1,"b":2}"#),
    ])]));
    let mut agent = AgentBuilder::new()
        .provider(provider)
        .typed_tool(AddTool::default())
        .build()
        .unwrap();

    let err = agent.send_message("go").await.unwrap_err();
    assert!(matches!(err, AgentError::MissingToolCallId(name) if name == "add"));
}

#[tokio::test]
async fn empty_tool_call_list_ends_the_loop() {
    let message = ResponseMessage {
        tool_calls: Some(Vec::new()),
        ..ResponseMessage::assistant("done anyway")
    };
    let provider = Arc::new(MockProvider::new(vec![Completion::from_message(
        message,
        FinishReason::ToolCalls,
    )]));
    let mut agent = AgentBuilder::new().provider(provider.clone()).build().unwrap();

    assert_eq!(agent.send_message("go").await.unwrap(), "done anyway");
    assert_eq!(provider.call_count().await, 1);
}

#[tokio::test]
async fn round_limit_stops_a_looping_provider() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider = Arc::new(MockProvider::new(vec![
        add_call("call_1"),
        add_call("call_2"),
        add_call("call_3"),
    ]));
    let mut agent = AgentBuilder::new()
        .provider(provider.clone())
        .typed_tool(AddTool {
            calls: calls.clone(),
        })
        .max_tool_rounds(2)
        .build()
        .unwrap();

    let err = agent.send_message("loop").await.unwrap_err();
    assert!(matches!(err, AgentError::RoundLimitExceeded(2)));
    assert_eq!(provider.call_count().await, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failure_keeps_queue_and_history() {
    let provider = Arc::new(MockProvider::with_results(vec![
        Err(AgentError::ProviderUnavailable("down".into())),
        Ok(Completion::from_text("back up")),
    ]));
    let mut agent = AgentBuilder::new().provider(provider.clone()).build().unwrap();

    let err = agent.send_message("hello?").await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(agent.pending().len(), 1);
    assert!(agent.history().is_empty());

    // Retrying resends the retained queue
    let reply = agent.send_messages_text(Vec::new()).await.unwrap();
    assert_eq!(reply, "back up");
    let requests = provider.requests().await;
    assert_eq!(requests[1].messages[1].text(), "hello?");
    assert_eq!(agent.history().len(), 2);
}

#[tokio::test]
async fn structured_reply_is_parsed() {
    let provider = Arc::new(MockProvider::new(vec![Completion::from_text(r#"{"value":42}"#)]));
    let mut agent = AgentBuilder::new()
        .provider(provider.clone())
        .typed_tool(AddTool::default())
        .build()
        .unwrap();

    let answer: Answer = agent.send_message_structured("answer?").await.unwrap();
    assert_eq!(answer, Answer { value: 42 });

    let request = &provider.requests().await[0];
    let Some(ResponseFormat::JsonSchema { json_schema }) = &request.response_format else {
        panic!("expected a json_schema response format");
    };
    assert!(json_schema.strict);
    assert_eq!(json_schema.name, "Answer");
    assert_eq!(json_schema.schema["additionalProperties"], json!(false));

    let tool = &request.tools.as_ref().unwrap()[0];
    assert_eq!(tool.function.strict, Some(true));

    assert_eq!(agent.history().last().unwrap().content, r#"{"value":42}"#);
}

#[tokio::test]
async fn malformed_structured_reply_leaves_state_untouched() {
    let provider = Arc::new(MockProvider::new(vec![Completion::from_text("not json")]));
    let mut agent = AgentBuilder::new().provider(provider).build().unwrap();

    let err = agent
        .send_message_structured::<Answer>("answer?")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::ResponseParse(_)));
    assert!(agent.history().is_empty());
    assert_eq!(agent.pending().len(), 1);
}

fn value_format() -> ResponseMode {
    ResponseMode::Structured(StructuredFormat::new(
        "answer",
        json!({
            "type": "object",
            "properties": {"value": {"type": "integer"}},
            "required": ["value"]
        }),
    ))
}

#[tokio::test]
async fn structured_reply_must_match_schema() {
    for reply in [r#"{"unrelated":"x"}"#, "[1,2]", r#"{"value":"42"}"#] {
        let provider = Arc::new(MockProvider::new(vec![Completion::from_text(reply)]));
        let mut agent = AgentBuilder::new().provider(provider).build().unwrap();

        let err = agent
            .send_messages(value_format(), vec![Message::user("answer?")])
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ResponseParse(_)), "{reply}: {err:?}");
        assert!(agent.history().is_empty());
        assert_eq!(agent.pending().len(), 1);
    }
}

#[tokio::test]
async fn structured_reply_matching_schema_is_returned() {
    let provider = Arc::new(MockProvider::new(vec![Completion::from_text(r#"{"value":7}"#)]));
    let mut agent = AgentBuilder::new().provider(provider).build().unwrap();

    let reply = agent
        .send_messages(value_format(), vec![Message::user("answer?")])
        .await
        .unwrap();
    assert_eq!(reply.into_structured(), Some(json!({"value": 7})));
}

/// A reply with an optional field left out
#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
struct Reading {
    celsius: f64,
    #[serde(default)]
    note: String,
}

#[tokio::test]
async fn strict_nulls_are_read_as_missing() {
    let provider = Arc::new(MockProvider::new(vec![Completion::from_text(
        r#"{"celsius":21.5,"note":null}"#,
    )]));
    let mut agent = AgentBuilder::new().provider(provider.clone()).build().unwrap();

    let reading: Reading = agent.send_message_structured("temperature?").await.unwrap();
    assert_eq!(
        reading,
        Reading {
            celsius: 21.5,
            note: String::new()
        }
    );

    let request = &provider.requests().await[0];
    let Some(ResponseFormat::JsonSchema { json_schema }) = &request.response_format else {
        panic!("expected a json_schema response format");
    };
    assert_eq!(json_schema.schema["required"], json!(["celsius", "note"]));
    assert_eq!(json_schema.schema["properties"]["note"]["type"], json!(["string", "null"]));
}

#[tokio::test]
async fn audio_reply_switches_model_and_records_transcript() {
    let provider = Arc::new(MockProvider::new(vec![audio_reply("Hi, spoken.")]));
    let mut agent = AgentBuilder::new()
        .provider(provider.clone())
        .audio_model("audio-model")
        .build()
        .unwrap();

    let reply = agent
        .send_messages_audio_response(vec![Message::user("Say hi")], Voice::Nova)
        .await
        .unwrap();
    assert_eq!(reply.audio.as_ref().unwrap().transcript, "Hi, spoken.");

    let request = &provider.requests().await[0];
    assert_eq!(request.model, "audio-model");
    assert_eq!(request.audio.as_ref().unwrap().voice, Voice::Nova);
    assert_eq!(agent.history().last().unwrap().content, "Hi, spoken.");
}

#[tokio::test]
async fn audio_mode_without_payload_fails() {
    let provider = Arc::new(MockProvider::new(vec![Completion::from_text("text only")]));
    let mut agent = AgentBuilder::new().provider(provider).build().unwrap();

    let err = agent
        .send_messages(ResponseMode::Audio(Voice::default()), vec![Message::user("speak")])
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::MissingAudioPayload));
    assert!(agent.history().is_empty());
}

#[tokio::test]
async fn send_messages_dispatches_on_mode() {
    let provider = Arc::new(MockProvider::new(vec![Completion::from_text("plain")]));
    let mut agent = AgentBuilder::new().provider(provider).build().unwrap();

    let reply = agent
        .send_messages(ResponseMode::Plain, vec![Message::user("hi")])
        .await
        .unwrap();
    assert!(matches!(reply, Reply::Text(text) if text == "plain"));
}

#[tokio::test]
async fn persisted_turns_are_only_the_new_ones() {
    let store = Arc::new(MemoryHistoryStore::new(10));
    store
        .save("alice", &[Message::user("old"), Message::assistant("older reply")])
        .unwrap();

    let provider = Arc::new(MockProvider::new(vec![Completion::from_text("fresh")]));
    let mut agent = AgentBuilder::new()
        .provider(provider.clone())
        .store(store.clone())
        .user_id("alice")
        .build()
        .unwrap();
    assert_eq!(agent.history().len(), 2);

    agent.add_message(Message::user("hidden").excluded_from_history());
    agent.send_message("new").await.unwrap();

    let stored: Vec<_> = store
        .all_messages("alice")
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(stored, ["old", "older reply", "new", "fresh"]);

    // Loaded history is sent ahead of the queue
    let texts: Vec<_> = provider.requests().await[0]
        .messages
        .iter()
        .map(|m| m.text())
        .collect();
    assert_eq!(texts[1..], ["old", "older reply", "hidden", "new"]);
}

#[tokio::test]
async fn agents_without_user_do_not_persist() {
    let store = Arc::new(MemoryHistoryStore::default());
    let provider = Arc::new(MockProvider::new(vec![Completion::from_text("ok")]));
    let mut agent = zerogpt_core::ChatAgent::new(
        provider,
        Arc::new(zerogpt_core::ToolRegistry::new()),
        zerogpt_core::AgentConfig::default(),
    );

    agent.send_message("hi").await.unwrap();
    assert!(agent.user_id().is_none());
    assert!(store.load("anyone").unwrap().is_empty());
}
