use crate::error::RagError;
use crate::providers::SearchProvider;

use serde::Serialize;

/// A discovered search service, the column holding its searchable text and
/// every column it can return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceMetadata {
    pub name: String,
    pub search_column: String,
    pub columns: Vec<String>,
}

impl ServiceMetadata {
    /// The search column is always part of `columns`.
    pub fn new(name: &str, search_column: &str, columns: &[&str]) -> Self {
        let mut all: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        if !all.iter().any(|c| c.eq_ignore_ascii_case(search_column)) {
            all.insert(0, search_column.to_string());
        }
        Self {
            name: name.to_string(),
            search_column: search_column.to_string(),
            columns: all,
        }
    }

    /// The column as the service spells it, matched ignoring case.
    pub fn column_named(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }
}

/// Lists every search service and describes each one, in listing order.
///
/// An empty list is a valid outcome; the chat session then refuses input.
pub async fn discover_services(search: &dyn SearchProvider) -> Result<Vec<ServiceMetadata>, RagError> {
    let names = search.list_services().await?;
    let mut services = Vec::with_capacity(names.len());

    for name in names {
        let service = search.describe_service(&name).await?;
        log::info!(
            "[DISCOVERY] Service {} searches column {} (columns: {})",
            service.name,
            service.search_column,
            service.columns.join(", ")
        );
        services.push(service);
    }

    if services.is_empty() {
        log::warn!("[DISCOVERY] No Cortex Search services found; question input is disabled.");
    }
    Ok(services)
}

pub fn find_service<'a>(services: &'a [ServiceMetadata], name: &str) -> Option<&'a ServiceMetadata> {
    services.iter().find(|s| s.name == name)
}

/// The preferred service when it was discovered, otherwise the first one.
pub fn initial_service<'a>(services: &'a [ServiceMetadata], preferred: &str) -> Option<&'a ServiceMetadata> {
    find_service(services, preferred).or_else(|| services.first())
}
