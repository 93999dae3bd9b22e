//! OpenAI-compatible chat-completions client.
//!
//! Thin HTTP wrapper for `{base_url}/chat/completions`, streaming and
//! single-shot. The internal four-role schema maps onto the wire almost
//! one-to-one; request building and response/chunk parsing are pure
//! functions for testability.

use serde::Serialize;
use serde_json::Value;

use super::sse::{self, PayloadOutcome};
use super::types::{
    ChatResponse, ChunkStream, LlmError, Message, Role, StreamChunk, ToolCall, ToolDefinition, vendor_error_message,
};

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: Option<u32>,
}

impl OpenAiClient {
    #[must_use]
    pub fn new(http: reqwest::Client, api_key: String, base_url: &str, model: String, max_tokens: Option<u32>) -> Self {
        Self { http, api_key, base_url: base_url.trim_end_matches('/').to_string(), model, max_tokens }
    }

    pub async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ChatResponse, LlmError> {
        let response = self.send(messages, tools, false).await?;
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;
        parse_response(&text)
    }

    pub async fn chat_stream(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ChunkStream, LlmError> {
        let response = self.send(messages, tools, true).await?;
        Ok(sse::decode_stream(response.bytes_stream(), parse_stream_payload))
    }

    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let body = build_request(&self.model, self.max_tokens, messages, tools, stream);
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiResponse { status: status.as_u16(), message: vendor_error_message(&body) });
        }
        Ok(response)
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
pub(crate) struct CcRequest<'a> {
    model: &'a str,
    messages: Vec<CcMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<CcToolDef<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Serialize)]
struct CcMessage<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<CcToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Serialize)]
struct CcToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: CcFunctionCall<'a>,
}

#[derive(Serialize)]
struct CcFunctionCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Serialize)]
struct CcToolDef<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: CcFunctionDef<'a>,
}

#[derive(Serialize)]
struct CcFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolDefinition> for CcToolDef<'a> {
    fn from(tool: &'a ToolDefinition) -> Self {
        Self {
            tool_type: "function",
            function: CcFunctionDef { name: &tool.name, description: &tool.description, parameters: &tool.parameters },
        }
    }
}

impl<'a> From<&'a Message> for CcMessage<'a> {
    fn from(message: &'a Message) -> Self {
        // Assistant turns that only request tools carry `content: null`.
        let content = if message.role == Role::Assistant && message.content.is_empty() && !message.tool_calls.is_empty()
        {
            None
        } else {
            Some(message.content.as_str())
        };
        Self {
            role: message.role.as_str(),
            content,
            tool_calls: message
                .tool_calls
                .iter()
                .map(|c| CcToolCall {
                    id: &c.id,
                    call_type: "function",
                    function: CcFunctionCall { name: &c.name, arguments: &c.arguments },
                })
                .collect(),
            tool_call_id: message.tool_call_id.as_deref(),
            name: message.tool_name.as_deref(),
        }
    }
}

pub(crate) fn build_request<'a>(
    model: &'a str,
    max_tokens: Option<u32>,
    messages: &'a [Message],
    tools: &'a [ToolDefinition],
    stream: bool,
) -> CcRequest<'a> {
    CcRequest {
        model,
        messages: messages.iter().map(CcMessage::from).collect(),
        tools: tools.iter().map(CcToolDef::from).collect(),
        max_tokens,
        stream,
    }
}

// =============================================================================
// RESPONSE PARSING
// =============================================================================

pub(crate) fn parse_response(json_text: &str) -> Result<ChatResponse, LlmError> {
    let root: Value = serde_json::from_str(json_text).map_err(|e| LlmError::ApiParse(e.to_string()))?;
    let model = root
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let Some(message) = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
    else {
        return Err(LlmError::ApiParse("chat_completions: missing choices[0].message".to_string()));
    };

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let Some(function) = call.get("function") else {
                continue;
            };
            let Some(name) = function.get("name").and_then(Value::as_str) else {
                continue;
            };
            let Some(id) = call.get("id").and_then(Value::as_str) else {
                return Err(LlmError::ApiParse("chat_completions: tool call missing id".to_string()));
            };
            tool_calls.push(ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments_text(function.get("arguments")),
            });
        }
    }

    Ok(ChatResponse::from_message(Message::assistant_tool_calls(content, tool_calls), model))
}

/// Some compatible servers send arguments as an object instead of a string.
fn arguments_text(raw: Option<&Value>) -> String {
    match raw {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "{}".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Map one `data:` payload of a chat-completions stream to chunks.
pub(crate) fn parse_stream_payload(payload: &str) -> Result<PayloadOutcome, String> {
    let root: Value = serde_json::from_str(payload).map_err(|e| e.to_string())?;

    if let Some(err) = root.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| err.to_string(), str::to_owned);
        return Ok(PayloadOutcome::Failed(message));
    }

    let Some(choices) = root.get("choices").and_then(Value::as_array) else {
        return Err("chunk missing choices".to_string());
    };
    // Usage-only trailers arrive with an empty choices array.
    let Some(delta) = choices.first().and_then(|c| c.get("delta")) else {
        return Ok(PayloadOutcome::Chunks(Vec::new()));
    };

    let mut chunks = Vec::new();
    if let Some(text) = delta.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            chunks.push(StreamChunk::Delta(text.to_string()));
        }
    }
    if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
        for (position, call) in calls.iter().enumerate() {
            let index = call
                .get("index")
                .and_then(Value::as_u64)
                .and_then(|i| usize::try_from(i).ok())
                .unwrap_or(position);
            let function = call.get("function");
            chunks.push(StreamChunk::ToolCallFragment {
                index,
                id: call.get("id").and_then(Value::as_str).map(str::to_owned),
                name: function
                    .and_then(|f| f.get("name"))
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                arguments: function
                    .and_then(|f| f.get("arguments"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    }
    Ok(PayloadOutcome::Chunks(chunks))
}

#[cfg(test)]
#[path = "openai_test.rs"]
mod tests;
