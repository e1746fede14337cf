use crate::convo::SessionConfig;
use crate::datam::Message;
use crate::discovery::{self, find_service, ServiceMetadata};
use crate::error::RagError;
use crate::prompts::{self, OUT_OF_SCOPE_MSG};
use crate::providers::{CompletionModel, CompletionProvider, SearchProvider};
use crate::retrieval::{self, format_context, CitationColumns};
use crate::topic;

use std::sync::Arc;

/// What one turn produced, including the intermediate strings debug mode shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    pub response: String,
    /// The topic gate refused the question; no backend was called.
    pub out_of_scope: bool,
    /// The retrieved-context string inserted into the prompt.
    pub context: Option<String>,
    /// The standalone question produced from the history, when one was made.
    pub history_summary: Option<String>,
}

/// A main prompt ready for the completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPrompt {
    pub prompt: String,
    pub context: String,
    pub history_summary: Option<String>,
}

/// The retrieval-augmented answer pipeline.
///
/// Holds the two backends and the services discovered for the session. It
/// keeps no conversation state: history and options are passed in per call.
#[derive(Clone)]
pub struct Orchestra {
    search: Arc<dyn SearchProvider>,
    completion: Arc<dyn CompletionProvider>,
    services: Vec<ServiceMetadata>,
    citation: CitationColumns,
}

impl Orchestra {
    pub fn new(
            search: Arc<dyn SearchProvider>,
            completion: Arc<dyn CompletionProvider>,
            services: Vec<ServiceMetadata>,
            citation: CitationColumns,
        ) -> Self {
        Self { search, completion, services, citation }
    }

    /// Creates an `Orchestra` after discovering the available search services.
    pub async fn discover(
            search: Arc<dyn SearchProvider>,
            completion: Arc<dyn CompletionProvider>,
            citation: CitationColumns,
        ) -> Result<Self, RagError> {
        let services = discovery::discover_services(search.as_ref()).await?;
        Ok(Self::new(search, completion, services, citation))
    }

    pub fn services(&self) -> &[ServiceMetadata] {
        &self.services
    }

    pub fn has_services(&self) -> bool {
        !self.services.is_empty()
    }

    /// A single completion call; the backend's text is returned untouched.
    pub async fn complete(&self, model: CompletionModel, prompt: &str) -> Result<String, RagError> {
        self.completion.complete(model, prompt).await
    }

    /// Asks the model to fold the history into a standalone question.
    pub async fn make_chat_history_summary(
            &self,
            model: CompletionModel,
            history: &[Message],
            question: &str,
        ) -> Result<String, RagError> {
        let chat_history = prompts::format_chat_history(history);
        let prompt = prompts::render_summary_prompt(&chat_history, question)?;
        let summary = self.complete(model, &prompt).await?;
        log::debug!("[ORCHESTRA] History summary: {}", summary);
        Ok(summary)
    }

    /// Retrieves at most `limit` excerpts from `service_name` and formats them.
    pub async fn query_search_service(
            &self,
            service_name: &str,
            query: &str,
            limit: usize,
        ) -> Result<String, RagError> {
        let service = find_service(&self.services, service_name).ok_or_else(|| {
            RagError::RetrievalError(format!("Unknown search service '{}'", service_name))
        })?;
        let excerpts =
            retrieval::retrieve(self.search.as_ref(), service, query, limit, &self.citation).await?;
        let context = format_context(&excerpts);
        log::debug!("[ORCHESTRA] Retrieved {} excerpts:\n{}", excerpts.len(), context);
        Ok(context)
    }

    /// Builds the main prompt for `question`.
    ///
    /// With history enabled and a non-empty window, retrieval runs on the
    /// model's standalone rewrite of the question; otherwise on the question
    /// itself. The prompt always carries the original question.
    pub async fn create_prompt(
            &self,
            config: &SessionConfig,
            history: &[Message],
            question: &str,
        ) -> Result<PreparedPrompt, RagError> {
        let service_name = config.selected_service.as_deref().ok_or_else(|| {
            RagError::ChatError("No search service is selected.".to_string())
        })?;
        let limit = usize::from(config.num_retrieved_chunks());

        let (chat_history, history_summary) = if config.use_chat_history && !history.is_empty() {
            let summary = self
                .make_chat_history_summary(config.model, history, question)
                .await?;
            (prompts::format_chat_history(history), Some(summary))
        } else {
            (String::new(), None)
        };

        let retrieval_query = history_summary.as_deref().unwrap_or(question);
        let context = self.query_search_service(service_name, retrieval_query, limit).await?;
        let prompt = prompts::render_main_prompt(&chat_history, &context, question)?;

        Ok(PreparedPrompt { prompt, context, history_summary })
    }

    /// Runs one turn: topic gate, then prompt assembly and completion.
    pub async fn answer(
            &self,
            config: &SessionConfig,
            history: &[Message],
            question: &str,
        ) -> Result<TurnOutcome, RagError> {
        if topic::is_out_of_scope(question) {
            log::info!("[ORCHESTRA] Question outside the audit-report topic; answering with the fixed notice.");
            return Ok(TurnOutcome {
                response: OUT_OF_SCOPE_MSG.to_string(),
                out_of_scope: true,
                ..Default::default()
            });
        }

        let prepared = self.create_prompt(config, history, question).await?;
        let response = self.complete(config.model, &prepared.prompt).await?;

        Ok(TurnOutcome {
            response,
            out_of_scope: false,
            context: Some(prepared.context),
            history_summary: prepared.history_summary,
        })
    }
}
