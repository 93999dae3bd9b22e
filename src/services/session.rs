//! Conversation store: sessions, history, and selections.
//!
//! ARCHITECTURE
//! ============
//! One in-memory map of sessions plus a user → session index enforcing at
//! most one active session per user. Readers get cloned snapshots; writers
//! replace whole fields. Each session carries a turn gate, an async mutex the
//! orchestrator holds for an entire turn so two turns on the same session
//! never interleave their read-modify-write of history.
//!
//! TRADE-OFFS
//! ==========
//! Nothing is persisted and nothing expires; sessions live until deleted or
//! the process exits.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::llm::types::Message;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(Uuid),
}

/// One user's conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub user: String,
    /// `[system?, (user, assistant)*]`.
    pub messages: Vec<Message>,
    pub selected_tools: Vec<String>,
    pub selected_data_sources: Vec<String>,
    /// Display name of the model used by the latest turn.
    pub model_name: Option<String>,
}

impl Session {
    fn new(user: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: user.to_string(),
            messages: Vec::new(),
            selected_tools: Vec::new(),
            selected_data_sources: Vec::new(),
            model_name: None,
        }
    }
}

struct SessionEntry {
    session: Session,
    turn_gate: Arc<Mutex<()>>,
}

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<Uuid, SessionEntry>,
    by_user: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<StoreInner>,
}

// =============================================================================
// OPERATIONS
// =============================================================================

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the user's session id, creating the session if needed. The
    /// flag is `true` when a new session was created.
    pub async fn create_or_get(&self, user: &str) -> (Uuid, bool) {
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.by_user.get(user) {
            return (*id, false);
        }
        let session = Session::new(user);
        let id = session.id;
        inner.by_user.insert(user.to_string(), id);
        inner
            .sessions
            .insert(id, SessionEntry { session, turn_gate: Arc::new(Mutex::new(())) });
        tracing::info!(session_id = %id, %user, "session: created");
        (id, true)
    }

    /// Snapshot of a session.
    pub async fn get(&self, id: Uuid) -> Option<Session> {
        self.inner
            .read()
            .await
            .sessions
            .get(&id)
            .map(|e| e.session.clone())
    }

    /// Snapshot of a session, only if `user` owns it.
    pub async fn get_owned(&self, id: Uuid, user: &str) -> Result<Session, SessionError> {
        self.get(id)
            .await
            .filter(|s| s.user == user)
            .ok_or(SessionError::NotFound(id))
    }

    /// The per-session mutex serializing turns.
    pub async fn turn_gate(&self, id: Uuid) -> Option<Arc<Mutex<()>>> {
        self.inner
            .read()
            .await
            .sessions
            .get(&id)
            .map(|e| Arc::clone(&e.turn_gate))
    }

    /// Replace the whole history.
    pub async fn replace_history(&self, id: Uuid, messages: Vec<Message>) -> Result<(), SessionError> {
        self.update(id, |s| s.messages = messages).await
    }

    pub async fn set_selections(
        &self,
        id: Uuid,
        tools: Vec<String>,
        data_sources: Vec<String>,
    ) -> Result<(), SessionError> {
        self.update(id, |s| {
            s.selected_tools = tools;
            s.selected_data_sources = data_sources;
        })
        .await
    }

    pub async fn set_model(&self, id: Uuid, model_name: &str) -> Result<(), SessionError> {
        self.update(id, |s| s.model_name = Some(model_name.to_string()))
            .await
    }

    /// Remove the session and its user mapping. Returns whether it existed.
    pub async fn delete(&self, id: Uuid) -> bool {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.sessions.remove(&id) else {
            return false;
        };
        if inner.by_user.get(&entry.session.user) == Some(&id) {
            inner.by_user.remove(&entry.session.user);
        }
        tracing::info!(session_id = %id, "session: deleted");
        true
    }

    async fn update<F>(&self, id: Uuid, apply: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut Session),
    {
        let mut inner = self.inner.write().await;
        let entry = inner.sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        apply(&mut entry.session);
        Ok(())
    }
}

// =============================================================================
// TRANSCRIPT
// =============================================================================

/// Plain-text transcript: a header block followed by `Role: content` lines.
#[must_use]
pub fn render_transcript(session: &Session, at: OffsetDateTime) -> String {
    let timestamp = at.format(&Rfc3339).unwrap_or_else(|_| at.unix_timestamp().to_string());
    let mut out = String::new();
    let _ = writeln!(out, "Session ID: {}", session.id);
    let _ = writeln!(out, "Timestamp: {timestamp}");
    let _ = writeln!(out, "Model: {}", session.model_name.as_deref().unwrap_or("default"));
    let _ = writeln!(out, "Tools: {}", join_or_none(&session.selected_tools));
    let _ = writeln!(out, "Data Sources: {}", join_or_none(&session.selected_data_sources));
    out.push('\n');
    for message in &session.messages {
        let _ = writeln!(out, "{}: {}", message.role.label(), message.content);
    }
    out
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() { "none".to_string() } else { items.join(", ") }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
