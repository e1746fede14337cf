use crate::error::RagError;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;

/// The author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Capitalized form used when history is rendered into a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

// --- Message Formatting Helpers ---

/// Creates a new Message with the "user" role.
pub fn format_user_message(content: String) -> Message {
    Message { role: Role::User, content }
}

/// Creates a new Message with the "assistant" role.
pub fn format_assistant_message(content: String) -> Message {
    Message { role: Role::Assistant, content }
}

// --- SQL API payloads ---

/// Column description inside `resultSetMetaData.rowType`.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnType {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetMetaData {
    #[serde(default)]
    pub num_rows: u64,
    #[serde(default)]
    pub row_type: Vec<ColumnType>,
    #[serde(default)]
    pub partition_info: Vec<JsonValue>,
}

/// Body of a SQL API answer, for both finished (200) and pending (202) statements.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResponse {
    #[serde(default)]
    pub result_set_meta_data: Option<ResultSetMetaData>,
    /// Cells arrive as strings (or null) whatever their SQL type.
    #[serde(default)]
    pub data: Vec<Vec<Option<String>>>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub statement_handle: Option<String>,
    #[serde(default)]
    pub statement_status_url: Option<String>,
}

/// A finished statement's rows, addressable by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn from_response(response: StatementResponse) -> Result<Self, RagError> {
        let meta = response.result_set_meta_data.ok_or_else(|| {
            RagError::ResponseParseError(format!(
                "Statement response has no result set metadata (message: {})",
                response.message.as_deref().unwrap_or("none")
            ))
        })?;
        if meta.partition_info.len() > 1 {
            log::warn!(
                "Statement returned {} partitions; only the first one is read.",
                meta.partition_info.len()
            );
        }
        Ok(Self {
            columns: meta.row_type.into_iter().map(|c| c.name).collect(),
            rows: response.data,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column lookup ignoring case: `SHOW` output is lower-case, user tables are not.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn column_values(&self, name: &str) -> Result<Vec<Option<&str>>, RagError> {
        let index = self.column_index(name).ok_or_else(|| {
            RagError::ResponseParseError(format!(
                "Column '{}' not found in result set (columns: {})",
                name,
                self.columns.join(", ")
            ))
        })?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(index).and_then(|cell| cell.as_deref()))
            .collect())
    }

    /// The first cell of the first row, as returned by scalar `SELECT`s.
    pub fn first_value(&self) -> Option<&str> {
        self.rows.first()?.first()?.as_deref()
    }
}

// --- Cortex Search payloads ---

/// One ranked hit, keyed by the requested column names.
pub type SearchRow = Map<String, JsonValue>;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchRow>,
    #[serde(default)]
    pub request_id: Option<String>,
}
