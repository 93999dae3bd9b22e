//! Model catalog entries parsed from the YAML configuration file.
//!
//! A catalog file looks like:
//!
//! ```yaml
//! llms:
//!   - name: GPT-4o mini
//!     provider: openai
//!     model: gpt-4o-mini
//!     api_key_env: OPENAI_API_KEY
//!     description: Fast general model
//!   - name: Claude Sonnet
//!     provider: anthropic
//!     base_url: ${ANTHROPIC_BASE_URL}
//!     model: claude-sonnet-4-5
//!     api_key_env: ANTHROPIC_API_KEY
//! ```
//!
//! Each raw entry is validated independently by [`ModelConfig::from_entry`];
//! the registry skips the ones that fail.

use serde::Deserialize;

use super::types::LlmError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    /// Map a catalog `provider` label to a wire protocol.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigParse`] for labels that name neither family.
    pub fn parse(label: &str) -> Result<Self, LlmError> {
        match label.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai-compatible" | "ollama" | "vllm" | "lmstudio" => Ok(Self::OpenAi),
            "anthropic" | "anthropic-compatible" | "claude" => Ok(Self::Anthropic),
            other => Err(LlmError::ConfigParse(format!("unknown provider: {other}"))),
        }
    }

    #[must_use]
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => DEFAULT_OPENAI_BASE_URL,
            Self::Anthropic => DEFAULT_ANTHROPIC_BASE_URL,
        }
    }
}

// =============================================================================
// RAW YAML
// =============================================================================

/// Top-level catalog file. Entries stay untyped here and are converted one
/// at a time, so a mistyped or non-mapping entry only loses itself.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub llms: Vec<serde_yaml::Value>,
}

/// One `llms:` entry exactly as written; every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawModelEntry {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key_env: Option<String>,
    pub description: Option<String>,
    pub max_tokens: Option<u32>,
}

// =============================================================================
// RESOLVED ENTRY
// =============================================================================

/// A validated catalog entry with its credential resolved.
#[derive(Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub name: String,
    pub provider: ProviderKind,
    /// The label as written in the catalog, shown in public listings.
    pub provider_label: String,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub description: Option<String>,
    pub max_tokens: Option<u32>,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl ModelConfig {
    /// Validate a raw entry and resolve its credential.
    ///
    /// `lookup` reads an environment variable; tests pass a closure over a map.
    ///
    /// # Errors
    ///
    /// [`LlmError::ConfigParse`] for a missing field, unknown provider, or an
    /// unresolvable `${VAR}` in `base_url`; [`LlmError::MissingApiKey`] when
    /// the credential variable is unset or empty.
    pub fn from_entry<F>(entry: &RawModelEntry, lookup: F) -> Result<Self, LlmError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = required(entry.name.as_ref(), "name")?;
        let provider_label = required(entry.provider.as_ref(), "provider")?;
        let model = required(entry.model.as_ref(), "model")?;
        let key_var = required(entry.api_key_env.as_ref(), "api_key_env")?;
        let provider = ProviderKind::parse(&provider_label)?;

        let api_key = lookup(&key_var)
            .filter(|v| !v.trim().is_empty())
            .ok_or(LlmError::MissingApiKey { var: key_var })?;

        let base_url = match entry.base_url.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => interpolate(raw, &lookup)?,
            None => provider.default_base_url().to_string(),
        };

        Ok(Self {
            name,
            provider,
            provider_label,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            description: entry.description.clone().filter(|d| !d.trim().is_empty()),
            max_tokens: entry.max_tokens,
        })
    }
}

fn required(value: Option<&String>, field: &str) -> Result<String, LlmError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| LlmError::ConfigParse(format!("missing required field '{field}'")))
}

/// Expand `${VAR}` references.
fn interpolate<F>(raw: &str, lookup: &F) -> Result<String, LlmError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(LlmError::ConfigParse(format!("unterminated ${{...}} in '{raw}'")));
        };
        let var = &after[..end];
        let value = lookup(var)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| LlmError::ConfigParse(format!("env var {var} referenced by base_url is not set")))?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
