//! Append-only NDJSON log per session at `<dir>/<session_id>.jsonl`.
//!
//! Failures are reported through `tracing` and otherwise ignored; a broken
//! log directory never fails a turn. A disabled logger drops every event.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SessionLogError {
    #[error("session log io: {0}")]
    Io(#[from] std::io::Error),
    #[error("session log timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

#[derive(Debug, Clone)]
pub struct SessionLogger {
    dir: Option<PathBuf>,
}

impl SessionLogger {
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self { dir: Some(dir.to_path_buf()) }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Log file for a session; `None` when logging is disabled.
    #[must_use]
    pub fn path_for(&self, session_id: Uuid) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{session_id}.jsonl")))
    }

    /// Append one event. `fields` should be a JSON object; other values are
    /// stored under `"data"`.
    pub async fn log(&self, session_id: Uuid, event: &str, fields: Value) {
        if let Err(e) = self.append(session_id, event, fields).await {
            tracing::warn!(%session_id, %event, error = %e, "session log: append failed");
        }
    }

    async fn append(&self, session_id: Uuid, event: &str, fields: Value) -> Result<(), SessionLogError> {
        let (Some(dir), Some(path)) = (&self.dir, self.path_for(session_id)) else {
            return Ok(());
        };
        let mut record = match fields {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".into(), other);
                map
            }
        };
        record.insert("event".into(), Value::String(event.to_string()));
        record.insert("session_id".into(), Value::String(session_id.to_string()));
        record.insert("timestamp".into(), Value::String(OffsetDateTime::now_utc().format(&Rfc3339)?));

        let mut line = Value::Object(record).to_string();
        line.push('\n');

        tokio::fs::create_dir_all(dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
