//! Basic arithmetic on two numbers.

use serde_json::{Value, json};

use super::{Tool, error_result};

pub struct BasicMathTool;

impl Tool for BasicMathTool {
    fn name(&self) -> &'static str {
        "BasicMathTool"
    }

    fn selection_id(&self) -> &'static str {
        "calculator"
    }

    fn description(&self) -> &'static str {
        "Performs basic arithmetic operations like addition, subtraction, multiplication, and division."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide"],
                    "description": "The arithmetic operation to perform."
                },
                "num1": { "type": "number", "description": "The first number." },
                "num2": { "type": "number", "description": "The second number." }
            },
            "required": ["operation", "num1", "num2"]
        })
    }

    fn prompt_fragment(&self) -> &'static str {
        "You have access to a calculator and should use it for any mathematical calculations. \
         Frame your thinking process around calculations and show your mathematical reasoning clearly."
    }

    fn execute(&self, args: &Value) -> Value {
        let operation = args.get("operation").and_then(Value::as_str).unwrap_or_default();
        let (Some(a), Some(b)) = (args.get("num1"), args.get("num2")) else {
            return error_result("Both num1 and num2 are required.");
        };
        let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
            return error_result("num1 and num2 must be numbers.");
        };

        // Whole-number operands keep a whole-number result where exact.
        if let (Some(i), Some(j)) = (a.as_i64(), b.as_i64()) {
            let exact = match operation {
                "add" => i.checked_add(j),
                "subtract" => i.checked_sub(j),
                "multiply" => i.checked_mul(j),
                _ => None,
            };
            if let Some(result) = exact {
                return json!({ "result": result });
            }
        }

        match operation {
            "add" => json!({ "result": x + y }),
            "subtract" => json!({ "result": x - y }),
            "multiply" => json!({ "result": x * y }),
            "divide" if y == 0.0 => error_result("Division by zero is not allowed."),
            "divide" => json!({ "result": x / y }),
            _ => error_result("Invalid operation."),
        }
    }
}
