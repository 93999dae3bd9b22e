//! Corporate directory lookup against a fixed table.

use serde_json::{Value, json};

use super::{Tool, failure_result};

struct DirectoryEntry {
    email: &'static str,
    name: &'static str,
    title: &'static str,
    department: &'static str,
}

const DIRECTORY: [DirectoryEntry; 3] = [
    DirectoryEntry {
        email: "john.doe@example.com",
        name: "John Doe",
        title: "Software Engineer",
        department: "Engineering",
    },
    DirectoryEntry {
        email: "jane.smith@example.com",
        name: "Jane Smith",
        title: "Product Manager",
        department: "Product",
    },
    DirectoryEntry {
        email: "peter.jones@example.com",
        name: "Peter Jones",
        title: "HR Specialist",
        department: "Human Resources",
    },
];

pub struct UserLookupTool;

impl Tool for UserLookupTool {
    fn name(&self) -> &'static str {
        "UserLookupTool"
    }

    fn selection_id(&self) -> &'static str {
        "user_lookup"
    }

    fn description(&self) -> &'static str {
        "Looks up user information in a corporate directory."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "email": { "type": "string", "description": "The email address of the user to look up." }
            },
            "required": ["email"]
        })
    }

    fn prompt_fragment(&self) -> &'static str {
        "You have access to user lookup capabilities for organizational information and staff directories."
    }

    fn execute(&self, args: &Value) -> Value {
        let Some(email) = args.get("email").and_then(Value::as_str) else {
            return failure_result("email is required.");
        };
        let needle = email.trim();
        match DIRECTORY.iter().find(|e| e.email.eq_ignore_ascii_case(needle)) {
            Some(entry) => json!({
                "user_info": {
                    "name": entry.name,
                    "email": entry.email,
                    "title": entry.title,
                    "department": entry.department
                },
                "status": "success"
            }),
            None => failure_result("User not found."),
        }
    }
}
