//! Read-only SQL over the sample payments/customers database.
//!
//! Each call opens its own read-only connection; only statements starting
//! with `SELECT` are accepted. Rows come back as column → value objects.

use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Map, Value, json};

use super::{Tool, failure_result};

pub struct SqlQueryTool {
    db_path: PathBuf,
}

impl SqlQueryTool {
    #[must_use]
    pub fn new(db_path: &Path) -> Self {
        Self { db_path: db_path.to_path_buf() }
    }

    fn query(&self, sql: &str) -> Result<Vec<Value>, rusqlite::Error> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut object = Map::with_capacity(columns.len());
            for (i, column) in columns.iter().enumerate() {
                object.insert(column.clone(), to_json(row.get_ref(i)?));
            }
            out.push(Value::Object(object));
        }
        Ok(out)
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn is_select(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
}

impl Tool for SqlQueryTool {
    fn name(&self) -> &'static str {
        "SQLQueryTool"
    }

    fn selection_id(&self) -> &'static str {
        "sql_query"
    }

    fn description(&self) -> &'static str {
        "Executes read-only SQL queries against a SQLite database (payments/customers data)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "A SELECT statement. Tables: customers(id, name, email), \
                                    payments(id, customer_id, amount, timestamp)."
                }
            },
            "required": ["query"]
        })
    }

    fn prompt_fragment(&self) -> &'static str {
        "You have access to database query capabilities for retrieving structured data and generating reports."
    }

    fn execute(&self, args: &Value) -> Value {
        let Some(sql) = args.get("query").and_then(Value::as_str) else {
            return failure_result("query is required.");
        };
        if !is_select(sql) {
            return failure_result("Only SELECT queries are allowed.");
        }
        match self.query(sql) {
            Ok(rows) => json!({ "results": rows, "status": "success" }),
            Err(e) => {
                tracing::debug!(error = %e, "sql tool: query failed");
                failure_result(format!("Database error: {e}"))
            }
        }
    }
}

// =============================================================================
// SAMPLE DATABASE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("seed database: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Create and populate the sample database unless `path` already exists.
/// Returns whether a new database was written.
///
/// # Errors
///
/// Returns [`SeedError`] if the directory or database cannot be written.
pub fn seed_sample_database(path: &Path) -> Result<bool, SeedError> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            customer_id INTEGER NOT NULL REFERENCES customers(id),
            amount REAL NOT NULL,
            timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        INSERT INTO customers (name, email) VALUES
            ('Alice Smith', 'alice@example.com'),
            ('Bob Johnson', 'bob@example.com'),
            ('Charlie Brown', 'charlie@example.com');

        INSERT INTO payments (customer_id, amount) VALUES
            (1, 100.0),
            (1, 50.0),
            (2, 75.5),
            (3, 120.0);
        ",
    )?;
    tracing::info!(path = %path.display(), "sql tool: seeded sample database");
    Ok(true)
}
