use super::SearchProvider;
use crate::config::SearchSettings;
use crate::datam::{ResultSet, SearchResponse, SearchRow};
use crate::discovery::ServiceMetadata;
use crate::error::RagError;
use crate::session::SnowflakeSession;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::sync::Arc;

static PLAIN_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("identifier regex is valid"));

/// Cortex Search services of one database/schema: listing and describing
/// go through SQL, queries through the REST endpoint.
pub struct CortexSearch {
    session: Arc<SnowflakeSession>,
    database: String,
    schema: String,
}

impl CortexSearch {
    pub fn new(session: Arc<SnowflakeSession>, settings: &SearchSettings) -> Self {
        Self {
            session,
            database: settings.database.clone(),
            schema: settings.schema.clone(),
        }
    }

    fn qualified_schema(&self) -> String {
        format!("{}.{}", quote_identifier(&self.database), quote_identifier(&self.schema))
    }
}

#[async_trait]
impl SearchProvider for CortexSearch {
    async fn list_services(&self) -> Result<Vec<String>, RagError> {
        let statement = format!("SHOW CORTEX SEARCH SERVICES IN SCHEMA {}", self.qualified_schema());
        let result = self.session.execute_sql(&statement, &[]).await?;
        Ok(result
            .column_values("name")?
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect())
    }

    async fn describe_service(&self, service: &str) -> Result<ServiceMetadata, RagError> {
        let statement = format!(
            "DESC CORTEX SEARCH SERVICE {}.{}",
            self.qualified_schema(),
            quote_identifier(service)
        );
        let result = self.session.execute_sql(&statement, &[]).await?;
        let search_column = first_cell(&result, "search_column").ok_or_else(|| {
            RagError::DiscoveryError(format!("Service '{}' reports no search column", service))
        })?;

        // `columns` when reported, else `attribute_columns`.
        let listed = first_cell(&result, "columns")
            .or_else(|| first_cell(&result, "attribute_columns"))
            .unwrap_or_default();
        let columns: Vec<&str> = split_column_list(&listed);
        Ok(ServiceMetadata::new(service, &search_column, &columns))
    }

    async fn search(
        &self,
        service: &str,
        query: &str,
        columns: &[String],
        limit: usize,
    ) -> Result<Vec<SearchRow>, RagError> {
        let endpoint = format!("{}:query", service);
        let url = self.session.api_url(&[
            "api",
            "v2",
            "databases",
            self.database.as_str(),
            "schemas",
            self.schema.as_str(),
            "cortex-search-services",
            endpoint.as_str(),
        ])?;
        let body = json!({
            "query": query,
            "columns": columns,
            "limit": limit,
        });

        let response_text = self.session.post_json(&url, &body).await?;
        let response: SearchResponse = serde_json::from_str(&response_text)?;
        log::debug!(
            "[CORTEX SEARCH] {} returned {} results (request {})",
            service,
            response.results.len(),
            response.request_id.as_deref().unwrap_or("-")
        );
        Ok(response.results)
    }
}

fn first_cell(result: &ResultSet, column: &str) -> Option<String> {
    let index = result.column_index(column)?;
    result.rows.first()?.get(index)?.clone().filter(|v| !v.trim().is_empty())
}

/// `"A, B,C"` into `["A", "B", "C"]`.
fn split_column_list(list: &str) -> Vec<&str> {
    list.split(',').map(str::trim).filter(|c| !c.is_empty()).collect()
}

/// Leaves plain identifiers alone and double-quotes anything else.
pub fn quote_identifier(name: &str) -> String {
    if PLAIN_IDENTIFIER.is_match(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
