//! Tools: named, schema-described callables the model may invoke mid-turn.
//!
//! DESIGN
//! ======
//! The registry is an explicit list built once at startup. A client selects
//! tools by `selection_id` (e.g. `calculator`) or by name; the model calls
//! them by name. Tools report failures in-band as `{"error": ...}` values,
//! never as Rust errors, so a bad call never aborts a turn.

pub mod code_exec;
pub mod math;
pub mod sql;
pub mod user_lookup;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::llm::types::{ToolCall, ToolDefinition};

/// Content of the tool message sent back when the model names an unknown tool.
pub const TOOL_NOT_FOUND: &str = "Tool not found.";

pub trait Tool: Send + Sync {
    /// Name the model calls the tool by.
    fn name(&self) -> &'static str;

    /// Short identifier a client selects the tool with.
    fn selection_id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema for the argument object.
    fn parameters(&self) -> Value;

    /// Guidance appended to the system prompt while the tool is selected.
    fn prompt_fragment(&self) -> &'static str;

    /// Run the tool. Blocking work is fine; callers use the blocking pool.
    fn execute(&self, args: &Value) -> Value;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Catalog entry for `/api/tools`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// The four built-in tools, with the SQL tool reading `sql_db_path`.
    #[must_use]
    pub fn standard(sql_db_path: &Path) -> Self {
        Self::new(vec![
            Arc::new(math::BasicMathTool),
            Arc::new(code_exec::CodeExecutionTool),
            Arc::new(user_lookup::UserLookupTool),
            Arc::new(sql::SqlQueryTool::new(sql_db_path)),
        ])
    }

    /// Look up by the name the model uses.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Look up a client selection entry (selection id or name).
    #[must_use]
    pub fn get_selected(&self, selection: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|t| t.selection_id() == selection || t.name() == selection)
            .cloned()
    }

    /// Recognized tools for a selection list, in selection order, without
    /// duplicates. Unknown entries are dropped.
    #[must_use]
    pub fn resolve_selection(&self, selections: &[String]) -> Vec<Arc<dyn Tool>> {
        let mut out: Vec<Arc<dyn Tool>> = Vec::new();
        for selection in selections {
            if let Some(tool) = self.get_selected(selection) {
                if !out.iter().any(|t| t.name() == tool.name()) {
                    out.push(tool);
                }
            }
        }
        out
    }

    #[must_use]
    pub fn definitions_for(&self, selections: &[String]) -> Vec<ToolDefinition> {
        self.resolve_selection(selections)
            .iter()
            .map(|t| t.definition())
            .collect()
    }

    #[must_use]
    pub fn catalog(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                id: t.selection_id(),
                name: t.name(),
                description: t.description(),
                parameters: t.parameters(),
            })
            .collect()
    }

    /// Execute one model-requested call and return the tool message content.
    ///
    /// Unknown names yield [`TOOL_NOT_FOUND`]. Arguments that are not a JSON
    /// object are treated as `{}`.
    pub async fn run(&self, call: &ToolCall) -> String {
        let Some(tool) = self.get(&call.name) else {
            tracing::warn!(tool = %call.name, "tools: model requested unknown tool");
            return TOOL_NOT_FOUND.to_string();
        };
        let args = parse_arguments(&call.arguments);
        let result = tokio::task::spawn_blocking(move || tool.execute(&args)).await;
        match result {
            Ok(value) => value.to_string(),
            Err(e) => {
                tracing::error!(tool = %call.name, error = %e, "tools: execution panicked");
                serde_json::json!({ "error": format!("Tool execution failed: {e}") }).to_string()
            }
        }
    }
}

fn parse_arguments(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => Value::Object(serde_json::Map::new()),
    }
}

/// In-band error result.
pub(crate) fn error_result(message: impl Into<String>) -> Value {
    serde_json::json!({ "error": message.into() })
}

/// In-band error result carrying `"status": "failure"`.
pub(crate) fn failure_result(message: impl Into<String>) -> Value {
    serde_json::json!({ "error": message.into(), "status": "failure" })
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
