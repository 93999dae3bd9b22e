//! Process configuration parsed from environment variables.
//!
//! SYSTEM CONTEXT
//! ==============
//! `main` loads `.env` (if present), builds one [`AppConfig`] and hands it to
//! [`crate::state::AppState`]. Nothing reads the environment after startup.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_APP_NAME: &str = "LLM Chat";
pub const DEFAULT_TEST_EMAIL: &str = "test@test.com";
pub const DEFAULT_LLM_CONFIG_PATH: &str = "config/llms.yml";
pub const DEFAULT_SESSION_LOG_DIR: &str = "logs";
pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_SQL_TOOL_DB_PATH: &str = "data/app.db";
pub const DEFAULT_SYSTEM_PROMPT_PATH: &str = "system_prompt.md";
pub const DEFAULT_LLM_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LLM_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LLM_MAX_TOKENS: u32 = 4096;

/// Timeouts applied to every outbound provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl LlmTimeouts {
    #[must_use]
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

impl Default for LlmTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_LLM_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_LLM_CONNECT_TIMEOUT_SECS }
    }
}

/// Where the base system prompt may come from, highest precedence first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSources {
    /// `SYSTEM_PROMPT_OVERRIDE`: literal operator override.
    pub override_text: Option<String>,
    /// Contents of `SYSTEM_PROMPT_FILE`, read once at startup.
    pub startup_content: Option<String>,
    /// On-disk default consulted when neither of the above is set.
    pub default_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub app_name: String,
    pub test_mode: bool,
    pub test_email: String,
    pub disable_llm_calls: bool,
    pub disable_websocket: bool,
    pub disable_session_log: bool,
    pub llm_config_path: PathBuf,
    pub prompt: PromptSources,
    pub session_log_dir: PathBuf,
    pub static_dir: PathBuf,
    pub sql_tool_db_path: PathBuf,
    pub timeouts: LlmTimeouts,
    pub default_max_tokens: u32,
}

impl AppConfig {
    /// Build typed config from environment variables. Every key is optional.
    ///
    /// - `PORT`: default 3000
    /// - `APP_NAME`
    /// - `TEST_MODE`, `TEST_EMAIL`: header-less auth fallback
    /// - `DISABLE_LLM_CALLS`, `DISABLE_WEBSOCKET`, `DISABLE_SESSION_LOG`
    /// - `LLM_CONFIG_PATH`: YAML model catalog
    /// - `SYSTEM_PROMPT_OVERRIDE`, `SYSTEM_PROMPT_FILE`
    /// - `SESSION_LOG_DIR`, `STATIC_DIR`, `SQL_TOOL_DB_PATH`
    /// - `LLM_REQUEST_TIMEOUT_SECS`, `LLM_CONNECT_TIMEOUT_SECS`, `LLM_DEFAULT_MAX_TOKENS`
    #[must_use]
    pub fn from_env() -> Self {
        let startup_content = env_non_empty("SYSTEM_PROMPT_FILE").and_then(|path| match std::fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(%path, error = %e, "system prompt file unreadable; falling back");
                None
            }
        });

        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            app_name: env_non_empty("APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            test_mode: env_bool("TEST_MODE").unwrap_or(false),
            test_email: env_non_empty("TEST_EMAIL").unwrap_or_else(|| DEFAULT_TEST_EMAIL.to_string()),
            disable_llm_calls: env_bool("DISABLE_LLM_CALLS").unwrap_or(false),
            disable_websocket: env_bool("DISABLE_WEBSOCKET").unwrap_or(false),
            disable_session_log: env_bool("DISABLE_SESSION_LOG").unwrap_or(false),
            llm_config_path: env_path("LLM_CONFIG_PATH", DEFAULT_LLM_CONFIG_PATH),
            prompt: PromptSources {
                override_text: env_non_empty("SYSTEM_PROMPT_OVERRIDE"),
                startup_content,
                default_path: PathBuf::from(DEFAULT_SYSTEM_PROMPT_PATH),
            },
            session_log_dir: env_path("SESSION_LOG_DIR", DEFAULT_SESSION_LOG_DIR),
            static_dir: env_path("STATIC_DIR", DEFAULT_STATIC_DIR),
            sql_tool_db_path: env_path("SQL_TOOL_DB_PATH", DEFAULT_SQL_TOOL_DB_PATH),
            timeouts: LlmTimeouts {
                request_secs: env_parse("LLM_REQUEST_TIMEOUT_SECS", DEFAULT_LLM_REQUEST_TIMEOUT_SECS),
                connect_secs: env_parse("LLM_CONNECT_TIMEOUT_SECS", DEFAULT_LLM_CONNECT_TIMEOUT_SECS),
            },
            default_max_tokens: env_parse("LLM_DEFAULT_MAX_TOKENS", DEFAULT_LLM_MAX_TOKENS),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            app_name: DEFAULT_APP_NAME.to_string(),
            test_mode: false,
            test_email: DEFAULT_TEST_EMAIL.to_string(),
            disable_llm_calls: false,
            disable_websocket: false,
            disable_session_log: false,
            llm_config_path: PathBuf::from(DEFAULT_LLM_CONFIG_PATH),
            prompt: PromptSources {
                override_text: None,
                startup_content: None,
                default_path: PathBuf::from(DEFAULT_SYSTEM_PROMPT_PATH),
            },
            session_log_dir: PathBuf::from(DEFAULT_SESSION_LOG_DIR),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            sql_tool_db_path: PathBuf::from(DEFAULT_SQL_TOOL_DB_PATH),
            timeouts: LlmTimeouts::default(),
            default_max_tokens: DEFAULT_LLM_MAX_TOKENS,
        }
    }
}

// =============================================================================
// ENV HELPERS
// =============================================================================

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_path(key: &str, default: &str) -> PathBuf {
    env_non_empty(key).map_or_else(|| PathBuf::from(default), PathBuf::from)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
