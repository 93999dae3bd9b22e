use super::*;
use crate::llm::types::{ChunkStream, LlmChat, ToolCall};
use crate::llm::{openai, sse};
use crate::state::test_helpers::{TEST_BASE_PROMPT, model_handle, test_app_state_with, test_app_state_with_llm, test_config};
use crate::tools::TOOL_NOT_FOUND;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

// =============================================================================
// MOCK LLM
// =============================================================================

enum StreamScript {
    Chunks(Vec<Result<StreamChunk, LlmError>>),
    /// Raw SSE body decoded with the OpenAI-compatible chunk parser.
    RawSse(Vec<&'static str>),
    Live(futures::channel::mpsc::UnboundedReceiver<Result<StreamChunk, LlmError>>),
    OpenFails(LlmError),
}

#[derive(Default)]
struct MockLlm {
    responses: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    chat_calls: Mutex<Vec<(Vec<Message>, Vec<ToolDefinition>)>>,
    stream_calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlm {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn reply(self: &Arc<Self>, text: &str) -> Arc<Self> {
        self.push_response(Ok(ChatResponse::from_message(Message::assistant(text), "mock")))
    }

    fn tool_call(self: &Arc<Self>, name: &str, arguments: &str) -> Arc<Self> {
        let call = ToolCall { id: "call_1".into(), name: name.into(), arguments: arguments.into() };
        self.push_response(Ok(ChatResponse::from_message(Message::assistant_tool_calls("", vec![call]), "mock")))
    }

    fn push_response(self: &Arc<Self>, response: Result<ChatResponse, LlmError>) -> Arc<Self> {
        self.responses.lock().unwrap().push_back(response);
        Arc::clone(self)
    }

    fn stream(self: &Arc<Self>, script: StreamScript) -> Arc<Self> {
        self.streams.lock().unwrap().push_back(script);
        Arc::clone(self)
    }

    fn chat_call_count(&self) -> usize {
        self.chat_calls.lock().unwrap().len()
    }

    fn stream_call_count(&self) -> usize {
        self.stream_calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl LlmChat for MockLlm {
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ChatResponse, LlmError> {
        self.chat_calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), tools.to_vec()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::ApiRequest("no scripted response".into())))
    }

    async fn chat_stream(&self, messages: &[Message], _tools: &[ToolDefinition]) -> Result<ChunkStream, LlmError> {
        self.stream_calls.lock().unwrap().push(messages.to_vec());
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::ApiRequest("no scripted stream".into()))?;
        match script {
            StreamScript::Chunks(items) => Ok(futures::stream::iter(items).boxed()),
            StreamScript::RawSse(parts) => {
                let bytes = futures::stream::iter(parts.into_iter().map(|p| Ok::<_, String>(p.as_bytes().to_vec())));
                Ok(sse::decode_stream(bytes, openai::parse_stream_payload))
            }
            StreamScript::Live(rx) => Ok(rx.boxed()),
            StreamScript::OpenFails(e) => Err(e),
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

const ALICE: &str = "alice@example.com";

async fn new_session(state: &AppState) -> Uuid {
    state.sessions.create_or_get(ALICE).await.0
}

fn request(content: &str, tools: &[&str], sources: &[&str]) -> TurnRequest {
    TurnRequest {
        content: content.into(),
        selected_tools: tools.iter().map(|s| (*s).to_string()).collect(),
        selected_data_sources: sources.iter().map(|s| (*s).to_string()).collect(),
        llm_name: None,
    }
}

async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

async fn run_turn(state: &AppState, id: Uuid, req: TurnRequest) -> Vec<StreamEvent> {
    let rx = start_turn(state, ALICE, id, req).await.unwrap();
    collect(rx).await
}

fn content_of(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Content(t) => Some(t.as_str()),
            _ => None,
        })
        .collect()
}

fn roles(messages: &[Message]) -> Vec<Role> {
    messages.iter().map(|m| m.role).collect()
}

async fn history(state: &AppState, id: Uuid) -> Vec<Message> {
    state.sessions.get(id).await.unwrap().messages
}

// =============================================================================
// REQUEST VALIDATION
// =============================================================================

#[test]
fn request_defaults_when_fields_absent() {
    let req = TurnRequest::from_value(&json!({})).unwrap();
    assert_eq!(req, TurnRequest::default());
}

#[test]
fn request_parses_all_fields() {
    let req = TurnRequest::from_value(&json!({
        "content": "hi",
        "selected_tools": ["calculator"],
        "selected_data_sources": ["data-test"],
        "llm_name": "GPT"
    }))
    .unwrap();
    assert_eq!(req.content, "hi");
    assert_eq!(req.selected_tools, vec!["calculator"]);
    assert_eq!(req.selected_data_sources, vec!["data-test"]);
    assert_eq!(req.llm_name.as_deref(), Some("GPT"));
}

#[test]
fn non_list_selections_are_rejected() {
    let err = TurnRequest::from_value(&json!({ "selected_tools": "calculator" })).unwrap_err();
    assert!(matches!(err, ChatError::InvalidRequest(ref m) if m == "selected_tools must be a list."));
    assert_eq!(err.error_code(), "E_INVALID_REQUEST");

    assert!(TurnRequest::from_value(&json!({ "selected_data_sources": {"a": 1} })).is_err());
    assert!(TurnRequest::from_value(&json!({ "selected_tools": [1, 2] })).is_err());
    assert!(TurnRequest::from_value(&json!(["not", "an", "object"])).is_err());
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[tokio::test]
async fn direct_answer_uses_single_call() {
    let llm = MockLlm::new().reply("4");
    let state = test_app_state_with_llm(llm.clone());
    let id = new_session(&state).await;

    let events = run_turn(&state, id, request("2+2?", &["calculator"], &[])).await;

    assert_eq!(
        events,
        vec![StreamEvent::ToolSelected("calculator".into()), StreamEvent::Content("4".into()), StreamEvent::End]
    );
    assert_eq!(llm.chat_call_count(), 1);
    assert_eq!(llm.stream_call_count(), 0);

    let (sent, tools) = llm.chat_calls.lock().unwrap()[0].clone();
    assert_eq!(roles(&sent), vec![Role::System, Role::User]);
    assert_eq!(tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["BasicMathTool"]);

    let messages = history(&state, id).await;
    assert_eq!(roles(&messages), vec![Role::System, Role::User, Role::Assistant]);
    assert!(messages[0].content.starts_with(TEST_BASE_PROMPT));
    assert!(messages[0].content.contains("You have access to a calculator"));
    assert_eq!(messages[1].content, "2+2?");
    assert_eq!(messages[2].content, "4");

    let session = state.sessions.get(id).await.unwrap();
    assert_eq!(session.selected_tools, vec!["calculator"]);
    assert_eq!(session.model_name.as_deref(), Some("test-model"));
}

#[tokio::test]
async fn tool_call_round_trip_streams_second_call() {
    let llm = MockLlm::new()
        .tool_call("BasicMathTool", r#"{"operation":"add","num1":5,"num2":3}"#)
        .stream(StreamScript::Chunks(vec![
            Ok(StreamChunk::Delta("5 + 3 = ".into())),
            Ok(StreamChunk::Delta("8".into())),
            Ok(StreamChunk::Done),
        ]));
    let state = test_app_state_with_llm(llm.clone());
    let id = new_session(&state).await;

    let events = run_turn(&state, id, request("What is 5+3?", &["calculator"], &[])).await;
    assert_eq!(content_of(&events), "5 + 3 = 8");
    assert_eq!(events.last(), Some(&StreamEvent::End));

    let sent = llm.stream_calls.lock().unwrap()[0].clone();
    assert_eq!(roles(&sent), vec![Role::System, Role::User, Role::Assistant, Role::Tool]);
    assert_eq!(sent[2].tool_calls[0].name, "BasicMathTool");
    assert_eq!(sent[3].content, r#"{"result":8}"#);
    assert_eq!(sent[3].tool_call_id.as_deref(), Some("call_1"));

    let messages = history(&state, id).await;
    assert_eq!(roles(&messages), vec![Role::System, Role::User, Role::Assistant]);
    assert_eq!(messages[2].content, "5 + 3 = 8");
}

#[tokio::test]
async fn unknown_tool_gets_not_found_marker() {
    let llm = MockLlm::new()
        .tool_call("Teleport", "{}")
        .stream(StreamScript::Chunks(vec![Ok(StreamChunk::Delta("Sorry.".into())), Ok(StreamChunk::Done)]));
    let state = test_app_state_with_llm(llm.clone());
    let id = new_session(&state).await;

    let events = run_turn(&state, id, request("beam me up", &[], &[])).await;
    assert_eq!(content_of(&events), "Sorry.");

    let sent = llm.stream_calls.lock().unwrap()[0].clone();
    let tool_msg = sent.last().unwrap();
    assert_eq!(tool_msg.role, Role::Tool);
    assert_eq!(tool_msg.content, TOOL_NOT_FOUND);
}

#[tokio::test]
async fn malformed_chunk_does_not_drop_valid_ones() {
    let llm = MockLlm::new().tool_call("BasicMathTool", "{}").stream(StreamScript::RawSse(vec![
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\"\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\ndata: [DONE]\n\n",
    ]));
    let state = test_app_state_with_llm(llm);
    let id = new_session(&state).await;

    let events = run_turn(&state, id, request("hi", &["calculator"], &[])).await;
    assert_eq!(content_of(&events), "Hello world");
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Error { .. })));
    assert_eq!(history(&state, id).await[2].content, "Hello world");
}

#[tokio::test]
async fn mid_stream_failure_reports_and_persists_partial() {
    let llm = MockLlm::new().tool_call("BasicMathTool", "{}").stream(StreamScript::Chunks(vec![
        Ok(StreamChunk::Delta("partial".into())),
        Err(LlmError::ApiRequest("connection reset".into())),
        Ok(StreamChunk::Delta("never".into())),
    ]));
    let state = test_app_state_with_llm(llm);
    let id = new_session(&state).await;

    let events = run_turn(&state, id, request("go", &[], &[])).await;
    assert_eq!(events[0], StreamEvent::Content("partial".into()));
    assert!(matches!(&events[1], StreamEvent::Error { code: Some("E_API_REQUEST"), retryable: true, .. }));
    assert_eq!(events[2], StreamEvent::End);
    assert_eq!(events.len(), 3);

    let messages = history(&state, id).await;
    assert_eq!(messages.last().unwrap().content, "partial");
}

#[tokio::test]
async fn stream_open_failure_reports_and_persists_nothing() {
    let llm = MockLlm::new()
        .tool_call("BasicMathTool", "{}")
        .stream(StreamScript::OpenFails(LlmError::ApiResponse { status: 503, message: "busy".into() }));
    let state = test_app_state_with_llm(llm);
    let id = new_session(&state).await;

    let events = run_turn(&state, id, request("go", &[], &[])).await;
    assert!(matches!(&events[0], StreamEvent::Error { .. }));
    assert_eq!(events.last(), Some(&StreamEvent::End));
    assert!(history(&state, id).await.is_empty());
}

#[tokio::test]
async fn empty_reply_persists_nothing() {
    let llm = MockLlm::new().reply("");
    let state = test_app_state_with_llm(llm);
    let id = new_session(&state).await;

    let events = run_turn(&state, id, request("hello?", &[], &["data-test"])).await;
    assert_eq!(events, vec![StreamEvent::DataSourceSelected("data-test".into()), StreamEvent::End]);

    let session = state.sessions.get(id).await.unwrap();
    assert!(session.messages.is_empty());
    assert!(session.selected_data_sources.is_empty());
}

#[tokio::test]
async fn only_recognized_selections_are_announced() {
    let llm = MockLlm::new().reply("ok");
    let state = test_app_state_with_llm(llm.clone());
    let id = new_session(&state).await;

    let events = run_turn(
        &state,
        id,
        request("x", &["weather", "sql_query", "SQLQueryTool"], &["mars", "new-mexico-history"]),
    )
    .await;
    assert_eq!(
        &events[..2],
        &[StreamEvent::ToolSelected("sql_query".into()), StreamEvent::DataSourceSelected("new-mexico-history".into())]
    );

    let (_, tools) = llm.chat_calls.lock().unwrap()[0].clone();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "SQLQueryTool");
}

// =============================================================================
// HISTORY SHAPE
// =============================================================================

#[tokio::test]
async fn history_keeps_alternating_shape_across_turns() {
    let llm = MockLlm::new()
        .reply("one")
        .tool_call("BasicMathTool", r#"{"operation":"multiply","num1":6,"num2":7}"#)
        .stream(StreamScript::Chunks(vec![Ok(StreamChunk::Delta("42".into())), Ok(StreamChunk::Done)]))
        .reply("three");
    let state = test_app_state_with_llm(llm.clone());
    let id = new_session(&state).await;

    run_turn(&state, id, request("first", &[], &[])).await;
    run_turn(&state, id, request("second", &["calculator"], &[])).await;
    run_turn(&state, id, request("third", &["calculator"], &[])).await;

    let messages = history(&state, id).await;
    assert_eq!(
        roles(&messages),
        vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    let contents: Vec<&str> = messages[1..].iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "one", "second", "42", "third", "three"]);

    // The third call saw the whole committed history plus the new user turn.
    let (sent, _) = llm.chat_calls.lock().unwrap()[2].clone();
    assert_eq!(sent.len(), 6);
    assert_eq!(sent.iter().filter(|m| m.role == Role::System).count(), 1);
}

#[tokio::test]
async fn selection_change_rewrites_system_prompt_in_place() {
    let llm = MockLlm::new().reply("a").reply("b").reply("c");
    let state = test_app_state_with_llm(llm);
    let id = new_session(&state).await;

    run_turn(&state, id, request("1", &[], &[])).await;
    assert_eq!(history(&state, id).await[0].content, TEST_BASE_PROMPT);

    run_turn(&state, id, request("2", &["user_lookup"], &["data-test"])).await;
    let messages = history(&state, id).await;
    assert_eq!(messages.iter().filter(|m| m.role == Role::System).count(), 1);
    assert!(messages[0].content.contains("TEST DATA SOURCE ACTIVE"));
    assert!(messages[0].content.contains("user lookup capabilities"));

    run_turn(&state, id, request("3", &[], &[])).await;
    let messages = history(&state, id).await;
    assert_eq!(messages[0].content, TEST_BASE_PROMPT);
    assert_eq!(messages.len(), 7);
}

// =============================================================================
// FAILURES BEFORE THE STREAM
// =============================================================================

#[tokio::test]
async fn first_call_failure_is_returned_and_nothing_written() {
    let llm = MockLlm::new().push_response(Err(LlmError::ApiResponse { status: 401, message: "bad key".into() }));
    let state = test_app_state_with_llm(llm.clone());
    let id = new_session(&state).await;

    let err = start_turn(&state, ALICE, id, request("hi", &["calculator"], &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Llm(LlmError::ApiResponse { status: 401, .. })));
    assert_eq!(llm.stream_call_count(), 0);

    let session = state.sessions.get(id).await.unwrap();
    assert!(session.messages.is_empty());
    assert!(session.selected_tools.is_empty());
}

#[tokio::test]
async fn foreign_or_unknown_session_is_not_found() {
    let llm = MockLlm::new().reply("never");
    let state = test_app_state_with_llm(llm.clone());
    let id = new_session(&state).await;

    let err = start_turn(&state, "mallory@example.com", id, request("hi", &[], &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::SessionNotFound(s) if s == id));

    let ghost = Uuid::new_v4();
    assert!(matches!(
        start_turn(&state, ALICE, ghost, request("hi", &[], &[])).await,
        Err(ChatError::SessionNotFound(_))
    ));
    assert_eq!(llm.chat_call_count(), 0);
}

#[tokio::test]
async fn unknown_model_and_empty_registry() {
    let state = test_app_state_with_llm(MockLlm::new());
    let id = new_session(&state).await;
    let mut req = request("hi", &[], &[]);
    req.llm_name = Some("Nope".into());
    let err = start_turn(&state, ALICE, id, req).await.unwrap_err();
    assert_eq!(err.to_string(), "LLM configuration 'Nope' not found.");

    let empty = test_app_state_with(test_config(), Vec::new());
    let id = new_session(&empty).await;
    assert!(matches!(
        start_turn(&empty, ALICE, id, request("hi", &[], &[])).await,
        Err(ChatError::NoModelsConfigured)
    ));
}

#[tokio::test]
async fn named_model_is_used_and_remembered() {
    let default = MockLlm::new();
    let other = MockLlm::new().reply("from other").reply("again");
    let state = test_app_state_with(
        test_config(),
        vec![model_handle("Default", default.clone()), model_handle("Other", other.clone())],
    );
    let id = new_session(&state).await;

    let mut req = request("hi", &[], &[]);
    req.llm_name = Some("Other".into());
    assert_eq!(content_of(&run_turn(&state, id, req).await), "from other");

    // No name on the next turn: the session's model sticks.
    assert_eq!(content_of(&run_turn(&state, id, request("more", &[], &[])).await), "again");
    assert_eq!(default.chat_call_count(), 0);
    assert_eq!(other.chat_call_count(), 2);
}

// =============================================================================
// CONCURRENCY & DISCONNECT
// =============================================================================

async fn wait_for_history_len(state: &AppState, id: Uuid, len: usize) -> Vec<Message> {
    for _ in 0..200 {
        let messages = history(state, id).await;
        if messages.len() >= len {
            return messages;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("history never reached {len} messages");
}

#[tokio::test]
async fn client_disconnect_still_persists_partial_reply() {
    let (chunk_tx, chunk_rx) = futures::channel::mpsc::unbounded();
    let llm = MockLlm::new()
        .tool_call("BasicMathTool", "{}")
        .stream(StreamScript::Live(chunk_rx));
    let state = test_app_state_with_llm(llm);
    let id = new_session(&state).await;

    let mut rx = start_turn(&state, ALICE, id, request("hi", &[], &[])).await.unwrap();
    chunk_tx.unbounded_send(Ok(StreamChunk::Delta("Hel".into()))).unwrap();
    assert_eq!(rx.recv().await, Some(StreamEvent::Content("Hel".into())));

    drop(rx);
    chunk_tx.unbounded_send(Ok(StreamChunk::Delta("lo".into()))).unwrap();

    let messages = wait_for_history_len(&state, id, 3).await;
    assert_eq!(messages[2].content, "Hello");
}

#[tokio::test]
async fn concurrent_turns_on_one_session_are_serialized() {
    let (chunk_tx, chunk_rx) = futures::channel::mpsc::unbounded();
    let llm = MockLlm::new()
        .tool_call("BasicMathTool", "{}")
        .stream(StreamScript::Live(chunk_rx))
        .reply("second reply");
    let state = test_app_state_with_llm(llm.clone());
    let id = new_session(&state).await;

    let first_rx = start_turn(&state, ALICE, id, request("first", &[], &[])).await.unwrap();

    let second = {
        let state = state.clone();
        tokio::spawn(async move { run_turn(&state, id, request("second", &[], &[])).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(llm.chat_call_count(), 1, "second turn must wait for the first");

    chunk_tx.unbounded_send(Ok(StreamChunk::Delta("first reply".into()))).unwrap();
    chunk_tx.unbounded_send(Ok(StreamChunk::Done)).unwrap();
    assert_eq!(content_of(&collect(first_rx).await), "first reply");
    assert_eq!(content_of(&second.await.unwrap()), "second reply");

    let messages = history(&state, id).await;
    let contents: Vec<&str> = messages[1..].iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "first reply", "second", "second reply"]);

    // The second turn was built on top of the first turn's committed history.
    let (sent, _) = llm.chat_calls.lock().unwrap()[1].clone();
    assert_eq!(roles(&sent), vec![Role::System, Role::User, Role::Assistant, Role::User]);
}
