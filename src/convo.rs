use crate::config::ChatDefaults;
use crate::datam::{format_assistant_message, format_user_message, Message};
use crate::discovery::{find_service, initial_service, ServiceMetadata};
use crate::error::RagError;
use crate::orchestra::{Orchestra, TurnOutcome};
use crate::providers::CompletionModel;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::ops::RangeInclusive;
use uuid::Uuid;

/// Accepted values for the chunk and history-window options.
pub const WINDOW_BOUNDS: RangeInclusive<u8> = 1..=10;

/// The options a user adjusts during a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionConfig {
    pub selected_service: Option<String>,
    pub model: CompletionModel,
    num_retrieved_chunks: u8,
    num_chat_messages: u8,
    pub debug: bool,
    pub use_chat_history: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            selected_service: None,
            model: CompletionModel::default(),
            num_retrieved_chunks: 5,
            num_chat_messages: 5,
            debug: false,
            use_chat_history: true,
        }
    }
}

impl SessionConfig {
    pub fn from_defaults(defaults: &ChatDefaults) -> Result<Self, RagError> {
        let mut config = Self {
            model: defaults.model.parse()?,
            debug: defaults.debug,
            use_chat_history: defaults.use_chat_history,
            ..Self::default()
        };
        config.set_num_retrieved_chunks(defaults.num_retrieved_chunks)?;
        config.set_num_chat_messages(defaults.num_chat_messages)?;
        Ok(config)
    }

    /// Default options with `service` preferred and history use set.
    pub fn for_service(service: &str, use_chat_history: bool) -> Self {
        Self {
            selected_service: Some(service.to_string()),
            use_chat_history,
            ..Self::default()
        }
    }

    pub fn num_retrieved_chunks(&self) -> u8 {
        self.num_retrieved_chunks
    }

    pub fn num_chat_messages(&self) -> u8 {
        self.num_chat_messages
    }

    pub fn set_num_retrieved_chunks(&mut self, value: u8) -> Result<(), RagError> {
        self.num_retrieved_chunks = check_bounds("retrieved chunks", value)?;
        Ok(())
    }

    pub fn set_num_chat_messages(&mut self, value: u8) -> Result<(), RagError> {
        self.num_chat_messages = check_bounds("chat history messages", value)?;
        Ok(())
    }
}

fn check_bounds(option: &str, value: u8) -> Result<u8, RagError> {
    if WINDOW_BOUNDS.contains(&value) {
        Ok(value)
    } else {
        Err(RagError::ConfigError(format!(
            "The number of {} must be between {} and {} (got {})",
            option,
            WINDOW_BOUNDS.start(),
            WINDOW_BOUNDS.end(),
            value
        )))
    }
}

/// The ordered messages of one chat session. Lives in memory only.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    messages: Vec<Message>,
}

impl Conversation {
    /// Creates a new, empty conversation.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// The `n` messages before the last one, which is the question in flight.
    pub fn chat_history(&self, n: usize) -> &[Message] {
        let Some(end) = self.messages.len().checked_sub(1) else {
            return &[];
        };
        let start = end.saturating_sub(n);
        &self.messages[start..end]
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// A chat session: the pipeline, the conversation and the user's options.
pub struct Chat {
    orchestra: Orchestra,
    pub conversation: Conversation,
    pub config: SessionConfig,
}

impl Chat {
    /// Starts a session with an empty conversation.
    ///
    /// `config.selected_service` names the preferred service; when it was
    /// not discovered the first discovered service is selected instead.
    pub fn new(orchestra: Orchestra, mut config: SessionConfig) -> Self {
        let preferred = config.selected_service.take().unwrap_or_default();
        config.selected_service =
            initial_service(orchestra.services(), &preferred).map(|s| s.name.clone());
        if let Some(selected) = &config.selected_service {
            if !preferred.is_empty() && *selected != preferred {
                log::warn!("[CHAT] Service '{}' not found; using '{}'", preferred, selected);
            }
        }

        Self {
            orchestra,
            conversation: Conversation::new(),
            config,
        }
    }

    pub fn services(&self) -> &[ServiceMetadata] {
        self.orchestra.services()
    }

    /// Questions are accepted only once at least one search service exists.
    pub fn input_enabled(&self) -> bool {
        self.orchestra.has_services()
    }

    pub fn select_service(&mut self, name: &str) -> Result<(), RagError> {
        let service = find_service(self.orchestra.services(), name).ok_or_else(|| {
            RagError::ConfigError(format!("Search service '{}' was not discovered", name))
        })?;
        self.config.selected_service = Some(service.name.clone());
        Ok(())
    }

    /// Empties the conversation, whatever its length.
    pub fn clear(&mut self) {
        self.conversation.clear();
    }

    /// Sends a user question through the pipeline and records both sides of
    /// the turn.
    ///
    /// The user message is recorded before any backend call, so it stays in
    /// the history when the turn fails.
    pub async fn send(&mut self, question: &str) -> Result<TurnOutcome, RagError> {
        if !self.input_enabled() {
            return Err(RagError::ChatError(
                "No search services are available; questions are disabled.".to_string(),
            ));
        }

        self.conversation.push(format_user_message(question.to_string()));
        let question_clean = question.replace('\'', "");

        let history = self
            .conversation
            .chat_history(usize::from(self.config.num_chat_messages()));
        let outcome = self
            .orchestra
            .answer(&self.config, history, &question_clean)
            .await?;

        self.conversation
            .push(format_assistant_message(outcome.response.clone()));
        Ok(outcome)
    }
}
