//! Event: the outbound unit of a streamed chat turn.
//!
//! ARCHITECTURE
//! ============
//! Every turn the server streams back is a sequence of events. SSE clients
//! receive one `data: {...}` record per event, websocket clients one text
//! message per event. Both transports end the sequence with the literal
//! [`END_MARKER`].
//!
//! DESIGN
//! ======
//! - Flat payloads: each event serializes to a single-level JSON object.
//! - Selection announcements carry a `type` tag; content and error events
//!   are untagged (`{"content": ...}` / `{"error": ...}`) for compatibility
//!   with existing clients.
//! - Errors that reach a client implement [`ErrorCode`] so the payload is
//!   grepable and carries a retry hint.

use serde_json::{Value, json};

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Terminal record closing every event stream.
pub const END_MARKER: &str = "[DONE]";

/// Payload key for incremental assistant text.
pub const EVENT_CONTENT: &str = "content";

/// Payload key for error messages.
pub const EVENT_ERROR: &str = "error";

/// Payload key for grepable error codes.
pub const EVENT_CODE: &str = "code";

/// Payload key for the retryable flag on error events.
pub const EVENT_RETRYABLE: &str = "retryable";

// =============================================================================
// TYPES
// =============================================================================

/// One event in a streamed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A tool is active for this turn.
    ToolSelected(String),
    /// A data source is active for this turn.
    DataSourceSelected(String),
    /// An increment of assistant text.
    Content(String),
    /// A failure after the stream started.
    Error {
        message: String,
        code: Option<&'static str>,
        retryable: bool,
    },
    /// End of stream.
    End,
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured error payloads.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

impl StreamEvent {
    /// Create an error event from a plain string.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into(), code: None, retryable: false }
    }

    /// Create a structured error event from a typed error.
    #[must_use]
    pub fn error_from(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self::Error { message: err.to_string(), code: Some(err.error_code()), retryable: err.retryable() }
    }

    /// `true` for the end-of-stream marker.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }
}

// =============================================================================
// ENCODING
// =============================================================================

impl StreamEvent {
    /// JSON payload for this event. `None` for [`StreamEvent::End`], which is
    /// framed as the bare [`END_MARKER`].
    #[must_use]
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::ToolSelected(tool) => Some(json!({ "type": "tool_selected", "tool": tool })),
            Self::DataSourceSelected(source) => {
                Some(json!({ "type": "data_source_selected", "data_source": source }))
            }
            Self::Content(text) => Some(json!({ EVENT_CONTENT: text })),
            Self::Error { message, code, retryable } => {
                let mut payload = json!({ EVENT_ERROR: message });
                if let Some(code) = code {
                    payload[EVENT_CODE] = json!(code);
                    payload[EVENT_RETRYABLE] = json!(retryable);
                }
                Some(payload)
            }
            Self::End => None,
        }
    }

    /// Wire text for this event: the JSON payload, or [`END_MARKER`].
    #[must_use]
    pub fn to_wire(&self) -> String {
        self.to_json()
            .map_or_else(|| END_MARKER.to_string(), |v| v.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
