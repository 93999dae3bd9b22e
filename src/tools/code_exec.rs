//! Simulated code execution. Nothing is run.

use serde_json::{Value, json};

use super::{Tool, error_result};

const LANGUAGES: [&str; 2] = ["python", "javascript"];

pub struct CodeExecutionTool;

impl Tool for CodeExecutionTool {
    fn name(&self) -> &'static str {
        "CodeExecutionTool"
    }

    fn selection_id(&self) -> &'static str {
        "code_execution"
    }

    fn description(&self) -> &'static str {
        "Executes a given code snippet in a safe, sandboxed environment (placeholder)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "language": {
                    "type": "string",
                    "enum": LANGUAGES,
                    "description": "The programming language of the code snippet."
                },
                "code": { "type": "string", "description": "The code snippet to execute." }
            },
            "required": ["language", "code"]
        })
    }

    fn prompt_fragment(&self) -> &'static str {
        "You have access to code execution capabilities. \
         You can discuss code examples and programming concepts with confidence."
    }

    fn execute(&self, args: &Value) -> Value {
        let (Some(language), Some(code)) =
            (args.get("language").and_then(Value::as_str), args.get("code").and_then(Value::as_str))
        else {
            return error_result("Both language and code are required.");
        };
        if !LANGUAGES.contains(&language) {
            return error_result(format!("Unsupported language: {language}"));
        }
        json!({
            "output": format!("Simulated output for {language} code: {code}"),
            "status": "success"
        })
    }
}
