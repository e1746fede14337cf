use crate::config::SearchSettings;
use crate::datam::SearchRow;
use crate::discovery::ServiceMetadata;
use crate::error::RagError;
use crate::providers::SearchProvider;

use serde_json::Value as JsonValue;
use std::fmt::Write as _;

/// Stands in for a citation identifier the search result did not carry.
pub const MISSING_ID: &str = "N/D";

/// Result columns that identify where an excerpt comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationColumns {
    pub document: String,
    pub section: String,
}

impl CitationColumns {
    pub fn from_settings(settings: &SearchSettings) -> Self {
        Self {
            document: settings.document_column.clone(),
            section: settings.section_column.clone(),
        }
    }
}

impl Default for CitationColumns {
    fn default() -> Self {
        Self {
            document: "RELATIVE_PATH".to_string(),
            section: "SECTION_ID".to_string(),
        }
    }
}

/// One ranked hit, reduced to its citation and text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedExcerpt {
    pub document_id: Option<String>,
    pub section_id: Option<String>,
    pub text: String,
}

impl RetrievedExcerpt {
    pub fn from_row(
            row: &SearchRow,
            search_column: &str,
            citation: &CitationColumns,
        ) -> Result<Self, RagError> {
        let text = match lookup(row, search_column) {
            Some(value) => cell_text(value).unwrap_or_else(|| {
                log::warn!("[RETRIEVAL] Result has a null '{}' value", search_column);
                String::new()
            }),
            None => {
                return Err(RagError::RetrievalError(format!(
                    "Search result has no '{}' column",
                    search_column
                )))
            }
        };

        Ok(Self {
            document_id: lookup(row, &citation.document).and_then(cell_text),
            section_id: lookup(row, &citation.section).and_then(cell_text),
            text,
        })
    }

    /// `Documento: <id>, Sección: <id>`, with `N/D` for missing identifiers.
    pub fn citation(&self) -> String {
        format!(
            "Documento: {}, Sección: {}",
            self.document_id.as_deref().unwrap_or(MISSING_ID),
            self.section_id.as_deref().unwrap_or(MISSING_ID)
        )
    }
}

/// Column names in search results do not follow a fixed case.
fn lookup<'a>(row: &'a SearchRow, column: &str) -> Option<&'a JsonValue> {
    row.get(column)
        .or_else(|| row.iter().find(|(key, _)| key.eq_ignore_ascii_case(column)).map(|(_, v)| v))
}

fn cell_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Concatenates excerpts in ranking order, each as a citation line, the
/// text, and a blank line. No excerpts give an empty string.
pub fn format_context(excerpts: &[RetrievedExcerpt]) -> String {
    let mut context = String::new();
    for excerpt in excerpts {
        let _ = write!(context, "{}\n{}\n\n", excerpt.citation(), excerpt.text);
    }
    context
}

/// The columns to request from `service`: its search column plus the
/// citation columns it exposes. Citation columns it lacks come back as `N/D`.
pub fn requested_columns(service: &ServiceMetadata, citation: &CitationColumns) -> Vec<String> {
    let mut columns = vec![service.search_column.clone()];
    for wanted in [&citation.document, &citation.section] {
        match service.column_named(wanted) {
            Some(column) => columns.push(column.to_string()),
            None => log::debug!("[RETRIEVAL] Service {} has no '{}' column", service.name, wanted),
        }
    }
    columns
}

/// Queries `service` for at most `limit` excerpts relevant to `query`.
pub async fn retrieve(
        search: &dyn SearchProvider,
        service: &ServiceMetadata,
        query: &str,
        limit: usize,
        citation: &CitationColumns,
    ) -> Result<Vec<RetrievedExcerpt>, RagError> {
    let columns = requested_columns(service, citation);
    let rows = search.search(&service.name, query, &columns, limit).await?;
    rows.iter()
        .map(|row| RetrievedExcerpt::from_row(row, &service.search_column, citation))
        .collect()
}
