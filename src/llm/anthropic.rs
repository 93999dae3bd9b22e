//! Anthropic Messages API client.
//!
//! Thin HTTP wrapper for `{base_url}/v1/messages`. The Messages API has no
//! `system` or `tool` roles, so [`build_request`] lifts the system message
//! into the top-level field and folds tool results into the preceding
//! assistant text. Pure parsing in `parse_response` and
//! `parse_stream_payload` for testability.

use serde::Serialize;
use serde_json::Value;

use super::sse::{self, PayloadOutcome};
use super::types::{
    ChatResponse, ChunkStream, LlmError, Message, Role, StreamChunk, ToolCall, ToolDefinition, vendor_error_message,
};

const API_VERSION: &str = "2023-06-01";

// =============================================================================
// CLIENT
// =============================================================================

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    #[must_use]
    pub fn new(http: reqwest::Client, api_key: String, base_url: &str, model: String, max_tokens: u32) -> Self {
        Self { http, api_key, endpoint: messages_endpoint(base_url), model, max_tokens }
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
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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

/// `https://api.anthropic.com` and `https://api.anthropic.com/v1` both map
/// to `.../v1/messages`.
fn messages_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = base.strip_suffix("/v1").unwrap_or(base);
    format!("{base}/v1/messages")
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
pub(crate) struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    stream: bool,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ApiTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

pub(crate) fn build_request<'a>(
    model: &'a str,
    max_tokens: u32,
    messages: &'a [Message],
    tools: &'a [ToolDefinition],
    stream: bool,
) -> ApiRequest<'a> {
    let system = messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .filter(|s| !s.is_empty());

    ApiRequest {
        model,
        max_tokens,
        system,
        messages: fold_messages(messages),
        tools: tools
            .iter()
            .map(|t| ApiTool { name: &t.name, description: &t.description, input_schema: &t.parameters })
            .collect(),
        stream,
    }
}

/// Collapse the four-role history into alternating user/assistant turns.
///
/// Tool-call requests and tool results become plain text on the assistant
/// side; consecutive same-role messages are merged.
fn fold_messages(messages: &[Message]) -> Vec<ApiMessage> {
    let mut out: Vec<ApiMessage> = Vec::new();
    for message in messages {
        let (role, text) = match message.role {
            Role::System => continue,
            Role::User => ("user", message.content.clone()),
            Role::Assistant => ("assistant", assistant_text(message)),
            Role::Tool => {
                let name = message.tool_name.as_deref().unwrap_or("tool");
                ("assistant", format!("[Tool result from {name}: {}]", message.content))
            }
        };
        if text.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(prev) if prev.role == role => {
                prev.content.push_str("\n\n");
                prev.content.push_str(&text);
            }
            _ => out.push(ApiMessage { role, content: text }),
        }
    }
    out
}

fn assistant_text(message: &Message) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !message.content.is_empty() {
        parts.push(message.content.clone());
    }
    for call in &message.tool_calls {
        parts.push(format!("[Tool call: {}({})]", call.name, call.arguments));
    }
    parts.join("\n\n")
}

// =============================================================================
// PARSING
// =============================================================================

pub(crate) fn parse_response(json_text: &str) -> Result<ChatResponse, LlmError> {
    let root: Value = serde_json::from_str(json_text).map_err(|e| LlmError::ApiParse(e.to_string()))?;
    let Some(blocks) = root.get("content").and_then(Value::as_array) else {
        return Err(LlmError::ApiParse("messages: missing content array".to_string()));
    };
    let model = root
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
            }
            Some("tool_use") => {
                let (Some(id), Some(name)) =
                    (block.get("id").and_then(Value::as_str), block.get("name").and_then(Value::as_str))
                else {
                    return Err(LlmError::ApiParse("messages: tool_use block missing id or name".to_string()));
                };
                let arguments = block
                    .get("input")
                    .map_or_else(|| "{}".to_string(), Value::to_string);
                tool_calls.push(ToolCall { id: id.to_string(), name: name.to_string(), arguments });
            }
            _ => {}
        }
    }

    Ok(ChatResponse::from_message(Message::assistant_tool_calls(text, tool_calls), model))
}

/// Map one `data:` payload of a Messages stream to chunks.
pub(crate) fn parse_stream_payload(payload: &str) -> Result<PayloadOutcome, String> {
    let root: Value = serde_json::from_str(payload).map_err(|e| e.to_string())?;
    let Some(event_type) = root.get("type").and_then(Value::as_str) else {
        return Err("event missing type".to_string());
    };
    let index = root
        .get("index")
        .and_then(Value::as_u64)
        .and_then(|i| usize::try_from(i).ok())
        .unwrap_or_default();

    match event_type {
        "content_block_start" => {
            let block = root.get("content_block").ok_or("content_block_start without block")?;
            match block.get("type").and_then(Value::as_str) {
                Some("tool_use") => Ok(PayloadOutcome::Chunks(vec![StreamChunk::ToolCallFragment {
                    index,
                    id: block.get("id").and_then(Value::as_str).map(str::to_owned),
                    name: block.get("name").and_then(Value::as_str).map(str::to_owned),
                    arguments: String::new(),
                }])),
                Some("text") => Ok(PayloadOutcome::Chunks(text_chunk(block.get("text")))),
                _ => Ok(PayloadOutcome::Chunks(Vec::new())),
            }
        }
        "content_block_delta" => {
            let delta = root.get("delta").ok_or("content_block_delta without delta")?;
            match delta.get("type").and_then(Value::as_str) {
                Some("text_delta") => Ok(PayloadOutcome::Chunks(text_chunk(delta.get("text")))),
                Some("input_json_delta") => Ok(PayloadOutcome::Chunks(vec![StreamChunk::ToolCallFragment {
                    index,
                    id: None,
                    name: None,
                    arguments: delta
                        .get("partial_json")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                }])),
                _ => Ok(PayloadOutcome::Chunks(Vec::new())),
            }
        }
        "message_stop" => Ok(PayloadOutcome::End),
        "error" => Ok(PayloadOutcome::Failed(vendor_error_message(payload))),
        // message_start, message_delta, content_block_stop, ping
        _ => Ok(PayloadOutcome::Chunks(Vec::new())),
    }
}

fn text_chunk(raw: Option<&Value>) -> Vec<StreamChunk> {
    match raw.and_then(Value::as_str) {
        Some(text) if !text.is_empty() => vec![StreamChunk::Delta(text.to_string())],
        _ => Vec::new(),
    }
}

#[cfg(test)]
#[path = "anthropic_test.rs"]
mod tests;
