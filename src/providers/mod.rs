use crate::datam::SearchRow;
use crate::discovery::ServiceMetadata;
use crate::error::RagError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The models the completion backend is asked for. The set is fixed; the
/// backend decides what each identifier means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionModel {
    #[default]
    #[serde(rename = "mistral-large")]
    MistralLarge,
    #[serde(rename = "snowflake-arctic")]
    SnowflakeArctic,
    #[serde(rename = "llama3-70b")]
    Llama3_70b,
    #[serde(rename = "llama3-8b")]
    Llama3_8b,
}

impl CompletionModel {
    pub const ALL: [CompletionModel; 4] = [
        CompletionModel::MistralLarge,
        CompletionModel::SnowflakeArctic,
        CompletionModel::Llama3_70b,
        CompletionModel::Llama3_8b,
    ];

    /// The identifier passed to `COMPLETE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionModel::MistralLarge => "mistral-large",
            CompletionModel::SnowflakeArctic => "snowflake-arctic",
            CompletionModel::Llama3_70b => "llama3-70b",
            CompletionModel::Llama3_8b => "llama3-8b",
        }
    }
}

impl fmt::Display for CompletionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletionModel {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        CompletionModel::ALL
            .into_iter()
            .find(|model| model.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let known: Vec<&str> = CompletionModel::ALL.iter().map(|m| m.as_str()).collect();
                RagError::ConfigError(format!(
                    "Model '{}' is not available. Choose one of: {}",
                    wanted,
                    known.join(", ")
                ))
            })
    }
}

/// The managed search backend: service listing, per-service column lookup
/// and ranked queries.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Names of every search service visible to the session, in listing order.
    async fn list_services(&self) -> Result<Vec<String>, RagError>;

    /// The search column of `service` and the columns its results can carry.
    async fn describe_service(&self, service: &str) -> Result<ServiceMetadata, RagError>;

    /// At most `limit` hits for `query`, best first, each carrying `columns`.
    async fn search(
        &self,
        service: &str,
        query: &str,
        columns: &[String],
        limit: usize,
    ) -> Result<Vec<SearchRow>, RagError>;
}

/// The hosted completion backend: one prompt in, one text out.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, model: CompletionModel, prompt: &str) -> Result<String, RagError>;
}

pub mod cortex_complete;
pub mod cortex_search;
