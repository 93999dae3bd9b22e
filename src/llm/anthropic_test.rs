use super::*;
use serde_json::json;

// =============================================================================
// build_request
// =============================================================================

#[test]
fn system_message_is_lifted_to_top_level() {
    let messages = vec![Message::system("You are terse."), Message::user("hi")];
    let body = serde_json::to_value(build_request("claude-x", 1024, &messages, &[], false)).unwrap();
    assert_eq!(
        body,
        json!({
            "model": "claude-x",
            "max_tokens": 1024,
            "system": "You are terse.",
            "messages": [{ "role": "user", "content": "hi" }],
            "stream": false
        })
    );
}

#[test]
fn tool_results_fold_into_preceding_assistant_text() {
    let call = ToolCall {
        id: "toolu_1".into(),
        name: "BasicMathTool".into(),
        arguments: r#"{"operation":"add","num1":5,"num2":3}"#.into(),
    };
    let messages = vec![
        Message::system("sys"),
        Message::user("What is 5+3?"),
        Message::assistant_tool_calls("", vec![call.clone()]),
        Message::tool_result(&call, r#"{"result":8}"#),
    ];
    let req = build_request("m", 512, &messages, &[], true);
    assert_eq!(
        req.messages,
        vec![
            ApiMessage { role: "user", content: "What is 5+3?".into() },
            ApiMessage {
                role: "assistant",
                content: "[Tool call: BasicMathTool({\"operation\":\"add\",\"num1\":5,\"num2\":3})]\n\n\
                          [Tool result from BasicMathTool: {\"result\":8}]"
                    .into(),
            },
        ]
    );
}

#[test]
fn tool_result_without_assistant_creates_one() {
    let call = ToolCall { id: "t".into(), name: "UserLookupTool".into(), arguments: "{}".into() };
    let messages = vec![Message::user("who?"), Message::tool_result(&call, "none")];
    let req = build_request("m", 16, &messages, &[], false);
    assert_eq!(req.messages.len(), 2);
    assert_eq!(req.messages[1].role, "assistant");
    assert_eq!(req.messages[1].content, "[Tool result from UserLookupTool: none]");
}

#[test]
fn user_assistant_order_preserved() {
    let messages = vec![
        Message::system("s"),
        Message::user("a"),
        Message::assistant("b"),
        Message::user("c"),
    ];
    let req = build_request("m", 16, &messages, &[], false);
    let roles: Vec<&str> = req.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec!["user", "assistant", "user"]);
}

#[test]
fn tools_use_input_schema() {
    let tools = vec![ToolDefinition {
        name: "SQLQueryTool".into(),
        description: "sql".into(),
        parameters: json!({ "type": "object" }),
    }];
    let messages = vec![Message::user("q")];
    let body = serde_json::to_value(build_request("m", 16, &messages, &tools, false)).unwrap();
    assert_eq!(body["tools"][0], json!({ "name": "SQLQueryTool", "description": "sql", "input_schema": { "type": "object" } }));
    assert!(body.get("system").is_none());
}

#[test]
fn endpoint_normalizes_base_url() {
    assert_eq!(messages_endpoint("https://api.anthropic.com"), "https://api.anthropic.com/v1/messages");
    assert_eq!(messages_endpoint("https://api.anthropic.com/v1/"), "https://api.anthropic.com/v1/messages");
}

// =============================================================================
// parse_response
// =============================================================================

#[test]
fn parse_text_blocks_are_concatenated() {
    let raw = r#"{"model":"claude-x","content":[{"type":"text","text":"Hello"},{"type":"text","text":" there"}],"stop_reason":"end_turn"}"#;
    let resp = parse_response(raw).unwrap();
    assert_eq!(resp.text(), "Hello there");
    assert_eq!(resp.model, "claude-x");
    assert_eq!(resp.message().unwrap().role, Role::Assistant);
}

#[test]
fn parse_tool_use_block() {
    let raw = r#"{
        "model": "claude-x",
        "content": [
            {"type": "text", "text": "Let me compute."},
            {"type": "tool_use", "id": "toolu_1", "name": "BasicMathTool", "input": {"operation": "add", "num1": 5, "num2": 3}}
        ]
    }"#;
    let resp = parse_response(raw).unwrap();
    assert_eq!(resp.text(), "Let me compute.");
    let call = &resp.tool_calls()[0];
    assert_eq!(call.id, "toolu_1");
    assert_eq!(call.name, "BasicMathTool");
    let args: Value = serde_json::from_str(&call.arguments).unwrap();
    assert_eq!(args, json!({"operation": "add", "num1": 5, "num2": 3}));
}

#[test]
fn parse_missing_content_is_error() {
    assert!(matches!(parse_response(r#"{"model":"m"}"#), Err(LlmError::ApiParse(_))));
}

// =============================================================================
// parse_stream_payload
// =============================================================================

#[test]
fn stream_text_delta() {
    let raw = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#;
    assert_eq!(parse_stream_payload(raw).unwrap(), PayloadOutcome::Chunks(vec![StreamChunk::Delta("Hi".into())]));
}

#[test]
fn stream_tool_use_start_and_json_delta() {
    let start = r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"BasicMathTool","input":{}}}"#;
    assert_eq!(
        parse_stream_payload(start).unwrap(),
        PayloadOutcome::Chunks(vec![StreamChunk::ToolCallFragment {
            index: 1,
            id: Some("toolu_1".into()),
            name: Some("BasicMathTool".into()),
            arguments: String::new(),
        }])
    );

    let delta = r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"num1\":"}}"#;
    assert_eq!(
        parse_stream_payload(delta).unwrap(),
        PayloadOutcome::Chunks(vec![StreamChunk::ToolCallFragment {
            index: 1,
            id: None,
            name: None,
            arguments: "{\"num1\":".into(),
        }])
    );
}

#[test]
fn stream_bookkeeping_events_yield_nothing() {
    for raw in [
        r#"{"type":"message_start","message":{"id":"msg_1"}}"#,
        r#"{"type":"ping"}"#,
        r#"{"type":"content_block_stop","index":0}"#,
        r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#,
    ] {
        assert_eq!(parse_stream_payload(raw).unwrap(), PayloadOutcome::Chunks(vec![]), "{raw}");
    }
}

#[test]
fn stream_message_stop_ends() {
    assert_eq!(parse_stream_payload(r#"{"type":"message_stop"}"#).unwrap(), PayloadOutcome::End);
}

#[test]
fn stream_error_event_fails() {
    let raw = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
    assert_eq!(parse_stream_payload(raw).unwrap(), PayloadOutcome::Failed("Overloaded".into()));
}

#[test]
fn stream_malformed_is_rejected() {
    assert!(parse_stream_payload("{\"type\":").is_err());
    assert!(parse_stream_payload(r#"{"index":0}"#).is_err());
}

#[tokio::test]
async fn decoded_stream_with_event_lines() {
    use futures::StreamExt;

    let body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"The answer\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" is 8.\"}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    let (a, b) = body.split_at(70);
    let bytes = futures::stream::iter(vec![Ok::<_, String>(a.as_bytes().to_vec()), Ok(b.as_bytes().to_vec())]);
    let chunks: Vec<StreamChunk> = sse::decode_stream(bytes, parse_stream_payload)
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(
        chunks,
        vec![StreamChunk::Delta("The answer".into()), StreamChunk::Delta(" is 8.".into()), StreamChunk::Done]
    );
}
