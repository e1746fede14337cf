use super::{CompletionModel, CompletionProvider};
use crate::error::RagError;
use crate::session::SnowflakeSession;

use async_trait::async_trait;
use std::sync::Arc;

const COMPLETE_STATEMENT: &str = "SELECT SNOWFLAKE.CORTEX.COMPLETE(?, ?)";

/// Cortex `COMPLETE`, called through the SQL API.
pub struct CortexComplete {
    session: Arc<SnowflakeSession>,
}

impl CortexComplete {
    pub fn new(session: Arc<SnowflakeSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl CompletionProvider for CortexComplete {
    async fn complete(&self, model: CompletionModel, prompt: &str) -> Result<String, RagError> {
        log::debug!("[CORTEX COMPLETE] model={} prompt_chars={}", model, prompt.chars().count());
        let result = self
            .session
            .execute_sql(COMPLETE_STATEMENT, &[model.as_str(), prompt])
            .await?;

        result.first_value().map(str::to_string).ok_or_else(|| {
            RagError::ResponseParseError(format!(
                "COMPLETE with model '{}' returned no value",
                model
            ))
        })
    }
}
