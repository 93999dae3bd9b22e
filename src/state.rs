//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! cloned into each turn task. Everything in it is built once at startup;
//! the only mutable parts are the session store and the model catalog, each
//! behind its own lock.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::registry::ModelRegistry;
use crate::services::prompt::{PromptComposer, resolve_base_prompt};
use crate::services::session::SessionStore;
use crate::services::session_log::SessionLogger;
use crate::tools::ToolRegistry;

/// Clone is required by Axum; all inner fields are Arc-wrapped or cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionStore>,
    pub models: Arc<ModelRegistry>,
    pub tools: ToolRegistry,
    pub composer: Arc<PromptComposer>,
    pub session_log: SessionLogger,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, models: ModelRegistry) -> Self {
        let tools = ToolRegistry::standard(&config.sql_tool_db_path);
        let base_prompt = resolve_base_prompt(&config.prompt);
        let composer = PromptComposer::new(base_prompt, tools.clone());
        let session_log = if config.disable_session_log {
            SessionLogger::disabled()
        } else {
            SessionLogger::new(&config.session_log_dir)
        };
        Self {
            config: Arc::new(config),
            sessions: Arc::new(SessionStore::new()),
            models: Arc::new(models),
            tools,
            composer: Arc::new(composer),
            session_log,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
