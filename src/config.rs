use crate::error::RagError;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

pub mod credentials;
pub use credentials::Credentials;

// --- Data Structures for defaults.json ---

/// Where the Cortex Search services live and which columns carry citations.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SearchSettings {
    pub database: String,
    pub schema: String,
    /// Service preselected when discovery finds it.
    pub default_service: String,
    pub document_column: String,
    pub section_column: String,
}

/// Initial values of the per-session chat options.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatDefaults {
    pub model: String,
    pub num_retrieved_chunks: u8,
    pub num_chat_messages: u8,
    #[serde(default)]
    pub use_chat_history: bool,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub search: SearchSettings,
    pub chat: ChatDefaults,
    /// File the container host refreshes with the session's OAuth token.
    pub host_token_path: PathBuf,
}

impl Settings {
    fn embedded() -> Result<Self, RagError> {
        // The defaults are compiled in, so the binary runs without any config file.
        let json_str = include_str!("config/defaults.json");
        serde_json::from_str(json_str)
            .map_err(|e| RagError::ConfigError(format!("Failed to parse defaults.json: {}", e)))
    }

    /// The compiled-in defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut settings = DEFAULT_SETTINGS.clone();
        settings.apply_overrides(get_optional_env_var);
        settings
    }

    /// Replaces search settings with whatever `lookup` yields for the
    /// `RAG_*` override variables.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let search = &mut self.search;
        let overrides: [(&str, &mut String); 5] = [
            ("RAG_SEARCH_DATABASE", &mut search.database),
            ("RAG_SEARCH_SCHEMA", &mut search.schema),
            ("RAG_DEFAULT_SERVICE", &mut search.default_service),
            ("RAG_DOCUMENT_COLUMN", &mut search.document_column),
            ("RAG_SECTION_COLUMN", &mut search.section_column),
        ];
        for (var_name, slot) in overrides {
            if let Some(value) = lookup(var_name) {
                log::debug!("[CONFIG] {} overrides '{}' with '{}'", var_name, slot, value);
                *slot = value;
            }
        }
    }
}

// --- Helper Functions ---

/// Gets a required variable from the environment, loading from a .env file first.
pub fn get_env_var(var_name: &str) -> Result<String, RagError> {
    get_optional_env_var(var_name).ok_or_else(|| {
        RagError::ConfigError(format!(
            "Environment variable '{}' not found. Please set it in your .env file.",
            var_name
        ))
    })
}

/// Gets an optional variable from the environment. Blank values count as unset.
pub fn get_optional_env_var(var_name: &str) -> Option<String> {
    dotenvy::dotenv().ok(); // Load .env file, ignore errors if it doesn't exist.
    env::var(var_name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

// --- Lazy Static Initializer ---

/// A global, lazily-initialized copy of the compiled-in defaults.
///
/// `defaults.json` is parsed only once, the first time it is accessed.
pub static DEFAULT_SETTINGS: Lazy<Settings> =
    Lazy::new(|| Settings::embedded().expect("Failed to load settings from defaults.json"));
