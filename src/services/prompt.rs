//! Prompt composition: the system message for a turn.
//!
//! DESIGN
//! ======
//! The base prompt is resolved once at startup from [`PromptSources`] and
//! frozen into the [`PromptComposer`]. `compose` is then a pure function of
//! the selected tools and data sources: base prompt, data-source fragments,
//! tool fragments, each block separated by a blank line. Unknown identifiers
//! contribute nothing.

use serde::Serialize;

use crate::config::PromptSources;
use crate::tools::ToolRegistry;

pub const FALLBACK_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

// =============================================================================
// DATA SOURCES
// =============================================================================

/// A named context block injected into the system prompt when selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataSource {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    #[serde(skip)]
    pub prompt_fragment: &'static str,
}

pub const DATA_SOURCES: [DataSource; 2] = [
    DataSource {
        id: "data-test",
        name: "Test Data Source",
        description: "A simple test data source for demonstration purposes",
        category: "testing",
        prompt_fragment: "TEST DATA SOURCE ACTIVE: This is a demonstration data source that provides sample test data. \
            It contains simulated information for testing purposes and should not be used for production queries. \
            The test data includes fictional user records, mock transactions, and placeholder content designed to \
            validate data source integration functionality.",
    },
    DataSource {
        id: "new-mexico-history",
        name: "New Mexico History",
        description: "Historical information and facts about the state of New Mexico",
        category: "historical",
        prompt_fragment: "NEW MEXICO HISTORICAL DATA SOURCE: You now have access to comprehensive historical \
            information about New Mexico. This includes data about the state's rich cultural heritage spanning from \
            ancient Pueblo civilizations through Spanish colonization (1598), Mexican territorial period (1821-1846), \
            and U.S. statehood (1912). Key topics include: Native American tribes (Pueblo, Navajo, Apache), Spanish \
            colonial missions, the Santa Fe Trail, territorial conflicts, mining history, nuclear research at Los \
            Alamos, and the unique tri-cultural blend of Native American, Hispanic, and Anglo influences that define \
            modern New Mexico. The state capital Santa Fe is one of the oldest continuously inhabited cities in the \
            United States.",
    },
];

#[must_use]
pub fn data_source(id: &str) -> Option<&'static DataSource> {
    DATA_SOURCES.iter().find(|d| d.id == id)
}

// =============================================================================
// BASE PROMPT
// =============================================================================

/// Resolve the base prompt: operator override, then startup content, then
/// the default file, then [`FALLBACK_SYSTEM_PROMPT`]. Blank values count as
/// absent.
#[must_use]
pub fn resolve_base_prompt(sources: &PromptSources) -> String {
    let non_blank = |s: &String| !s.trim().is_empty();

    if let Some(text) = sources.override_text.as_ref().filter(|s| non_blank(s)) {
        return text.clone();
    }
    if let Some(text) = sources.startup_content.as_ref().filter(|s| non_blank(s)) {
        return text.clone();
    }
    match std::fs::read_to_string(&sources.default_path) {
        Ok(text) if non_blank(&text) => return text,
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %sources.default_path.display(), error = %e, "prompt: default file unreadable");
        }
    }
    FALLBACK_SYSTEM_PROMPT.to_string()
}

// =============================================================================
// COMPOSER
// =============================================================================

pub struct PromptComposer {
    base: String,
    tools: ToolRegistry,
}

impl PromptComposer {
    #[must_use]
    pub fn new(base: String, tools: ToolRegistry) -> Self {
        Self { base, tools }
    }

    #[must_use]
    pub fn compose(&self, selected_tools: &[String], selected_data_sources: &[String]) -> String {
        let mut blocks: Vec<&str> = vec![self.base.trim_end()];

        let mut seen_sources: Vec<&str> = Vec::new();
        for id in selected_data_sources {
            if let Some(source) = data_source(id) {
                if !seen_sources.contains(&source.id) {
                    seen_sources.push(source.id);
                    blocks.push(source.prompt_fragment);
                }
            }
        }

        for tool in self.tools.resolve_selection(selected_tools) {
            blocks.push(tool.prompt_fragment());
        }

        blocks.join("\n\n")
    }
}

#[cfg(test)]
#[path = "prompt_test.rs"]
mod tests;
