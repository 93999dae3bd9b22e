//! Model registry: named catalog entries resolved to ready adapters.
//!
//! DESIGN
//! ======
//! The catalog is loaded from YAML into an immutable [`Catalog`] behind an
//! `RwLock<Arc<_>>`. `resolve` clones out an `Arc<ModelHandle>`, so a turn
//! that resolved a model keeps using it even if `reload` swaps the catalog
//! mid-flight. Invalid entries are skipped with a warning; a missing or
//! unparseable file yields an empty registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use super::config::{CatalogFile, ModelConfig, RawModelEntry};
use super::types::{LlmError, Message};
use super::{LlmChat, LlmClient};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("LLM configuration '{0}' not found.")]
    NotFound(String),
    #[error("no LLM configurations are available")]
    Empty,
}

impl crate::event::ErrorCode for RegistryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_MODEL_NOT_FOUND",
            Self::Empty => "E_NO_MODELS",
        }
    }
}

/// Why the startup round trip against the default model failed.
#[derive(Debug, thiserror::Error)]
pub enum HealthCheckError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// A resolved catalog entry paired with its adapter.
pub struct ModelHandle {
    pub config: ModelConfig,
    pub client: Arc<dyn LlmChat>,
}

impl ModelHandle {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }
}

/// Credential-free view of an entry for client selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicModel {
    pub name: String,
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Default)]
struct Catalog {
    /// Config-file order; the first entry is the default model.
    ordered: Vec<Arc<ModelHandle>>,
    by_name: HashMap<String, Arc<ModelHandle>>,
}

impl Catalog {
    fn from_handles(handles: Vec<ModelHandle>) -> Self {
        let mut catalog = Self::default();
        for handle in handles {
            if catalog.by_name.contains_key(handle.name()) {
                tracing::warn!(model = %handle.name(), "llm registry: duplicate name; keeping first");
                continue;
            }
            let handle = Arc::new(handle);
            catalog.by_name.insert(handle.name().to_string(), Arc::clone(&handle));
            catalog.ordered.push(handle);
        }
        catalog
    }
}

/// Where a reload reads from and how it builds clients.
struct CatalogSource {
    path: PathBuf,
    http: reqwest::Client,
    default_max_tokens: u32,
}

pub struct ModelRegistry {
    source: Option<CatalogSource>,
    catalog: RwLock<Arc<Catalog>>,
}

// =============================================================================
// LOADING
// =============================================================================

impl ModelRegistry {
    /// Load the catalog at `path`, resolving credentials from the process
    /// environment.
    #[must_use]
    pub fn load(path: &Path, http: reqwest::Client, default_max_tokens: u32) -> Self {
        let source = CatalogSource { path: path.to_path_buf(), http, default_max_tokens };
        let catalog = source.read();
        Self { source: Some(source), catalog: RwLock::new(Arc::new(catalog)) }
    }

    /// Build a fixed registry from prepared handles. `reload` is a no-op.
    #[must_use]
    pub fn from_handles(handles: Vec<ModelHandle>) -> Self {
        Self { source: None, catalog: RwLock::new(Arc::new(Catalog::from_handles(handles))) }
    }

    /// Re-read the catalog file and swap it in. Returns the new model count.
    pub fn reload(&self) -> usize {
        let Some(source) = &self.source else {
            return self.len();
        };
        let fresh = Arc::new(source.read());
        let count = fresh.ordered.len();
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        tracing::info!(count, path = %source.path.display(), "llm registry: reloaded");
        count
    }

    fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    // =========================================================================
    // LOOKUP
    // =========================================================================

    /// Resolve a model by display name, or the default model when `name` is
    /// `None`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] for an unknown name, [`RegistryError::Empty`]
    /// when no name is given and the catalog is empty.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<ModelHandle>, RegistryError> {
        let catalog = self.snapshot();
        match name {
            Some(name) => catalog
                .by_name
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(name.to_string())),
            None => catalog.ordered.first().cloned().ok_or(RegistryError::Empty),
        }
    }

    /// Send one `"hi"` to the default model and return its name.
    ///
    /// # Errors
    ///
    /// An empty catalog, or the provider call failing.
    pub async fn check_default(&self) -> Result<String, HealthCheckError> {
        let handle = self.resolve(None)?;
        handle.client.chat(&[Message::user("hi")], &[]).await?;
        Ok(handle.name().to_string())
    }

    #[must_use]
    pub fn list_public(&self) -> Vec<PublicModel> {
        self.snapshot()
            .ordered
            .iter()
            .map(|h| PublicModel {
                name: h.config.name.clone(),
                provider: h.config.provider_label.clone(),
                model: h.config.model.clone(),
                description: h.config.description.clone(),
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CatalogSource {
    fn read(&self) -> Catalog {
        let configs = read_catalog_file(&self.path, |var| std::env::var(var).ok());
        let handles = configs
            .into_iter()
            .map(|config| {
                let client = LlmClient::from_config(&config, self.http.clone(), self.default_max_tokens);
                ModelHandle { config, client: Arc::new(client) }
            })
            .collect();
        Catalog::from_handles(handles)
    }
}

fn read_catalog_file<F>(path: &Path, lookup: F) -> Vec<ModelConfig>
where
    F: Fn(&str) -> Option<String>,
{
    match std::fs::read_to_string(path) {
        Ok(text) => parse_catalog(&text, lookup),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "llm registry: catalog unreadable; no models loaded");
            Vec::new()
        }
    }
}

/// Parse catalog YAML into valid entries, skipping the invalid ones.
pub(crate) fn parse_catalog<F>(text: &str, lookup: F) -> Vec<ModelConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let file: CatalogFile = match serde_yaml::from_str::<Option<CatalogFile>>(text) {
        Ok(parsed) => parsed.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "llm registry: invalid catalog format; no models loaded");
            return Vec::new();
        }
    };

    let mut configs: Vec<ModelConfig> = Vec::with_capacity(file.llms.len());
    for (position, raw) in file.llms.into_iter().enumerate() {
        let entry: RawModelEntry = match serde_yaml::from_value(raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(position, error = %e, "llm registry: malformed entry skipped");
                continue;
            }
        };
        match ModelConfig::from_entry(&entry, &lookup) {
            Ok(config) if configs.iter().any(|c| c.name == config.name) => {
                tracing::warn!(position, model = %config.name, "llm registry: duplicate name; entry skipped");
            }
            Ok(config) => {
                tracing::info!(model = %config.name, provider = %config.provider_label, "llm registry: loaded");
                configs.push(config);
            }
            Err(e) => {
                let name = entry.name.as_deref().unwrap_or("<unnamed>");
                tracing::warn!(position, model = %name, error = %e, "llm registry: entry skipped");
            }
        }
    }
    configs
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
