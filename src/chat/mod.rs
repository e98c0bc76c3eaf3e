//! The chat exchange: validate, record, complete, record, truncate.

use axum::http::StatusCode;
use clap::ValueEnum;
use log::{ error, info };
use std::sync::Arc;
use thiserror::Error;

use crate::cli::Args;
use crate::config::prompt::{ self, SystemPrompt };
use crate::history::{ HistoryStore, DEFAULT_MAX_TURNS };
use crate::llm::chat::{
    ChatClient,
    CompletionRequest,
    LlmError,
    CODE_INSUFFICIENT_QUOTA,
    CODE_INVALID_API_KEY,
};
use crate::models::chat::{ ChatRequest, ChatResponse, Turn };

pub const MSG_REQUIRED: &str = "Message is required";
pub const MSG_TOO_LONG: &str = "Message is too long";
pub const MSG_INVALID_BODY: &str = "Invalid request body";

/// When the user's turn is written to the conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CommitPolicy {
    /// Record the user turn before calling upstream and keep it if the call fails.
    RecordUserTurn,
    /// Record the user and assistant turns together once the call succeeds.
    OnSuccess,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")] InvalidRequest(&'static str),
    #[error("OpenAI API key not configured")]
    Configuration,
    #[error("OpenAI API quota exceeded. Please try again later.")] UpstreamQuotaExceeded(
        #[source] LlmError,
    ),
    #[error("Invalid OpenAI API key configured.")] UpstreamAuth(#[source] LlmError),
    #[error("An error occurred while processing your request.")] UpstreamGeneric(
        #[source] LlmError,
    ),
    #[error("Too many requests. Please slow down.")]
    RateLimited,
}

impl ChatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ChatError::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::UpstreamQuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            ChatError::UpstreamAuth(_) => StatusCode::UNAUTHORIZED,
            ChatError::UpstreamGeneric(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl From<LlmError> for ChatError {
    fn from(err: LlmError) -> Self {
        match err.code() {
            Some(CODE_INSUFFICIENT_QUOTA) => ChatError::UpstreamQuotaExceeded(err),
            Some(CODE_INVALID_API_KEY) => ChatError::UpstreamAuth(err),
            _ => ChatError::UpstreamGeneric(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub max_turns: usize,
    /// Zero (the default) disables the length check.
    pub max_message_chars: usize,
    pub commit_policy: CommitPolicy,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            max_message_chars: 0,
            commit_policy: CommitPolicy::RecordUserTurn,
        }
    }
}

impl ChatSettings {
    pub fn from_args(args: &Args) -> Self {
        Self {
            max_turns: args.history_max_turns,
            max_message_chars: args.max_message_chars,
            commit_policy: args.commit_policy,
        }
    }
}

#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn HistoryStore>,
    client: Option<Arc<dyn ChatClient>>,
    system_prompt: SystemPrompt,
    settings: ChatSettings,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        client: Option<Arc<dyn ChatClient>>,
        system_prompt: SystemPrompt,
        settings: ChatSettings
    ) -> Self {
        Self { store, client, system_prompt, settings }
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    fn validate<'a>(&self, request: &'a ChatRequest) -> Result<&'a str, ChatError> {
        let message = match request.message.as_deref() {
            Some(m) if !m.is_empty() => m,
            _ => {
                return Err(ChatError::InvalidRequest(MSG_REQUIRED));
            }
        };
        let limit = self.settings.max_message_chars;
        if limit > 0 && message.chars().count() > limit {
            return Err(ChatError::InvalidRequest(MSG_TOO_LONG));
        }
        Ok(message)
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<ChatResponse, ChatError> {
        let message = self.validate(&request)?;
        let client = self.client.as_ref().ok_or(ChatError::Configuration)?;
        let conversation_id = request.resolved_conversation_id();
        let max_turns = self.settings.max_turns;

        let _guard = self.store.lock(conversation_id).await;

        let mut history = self.store.get(conversation_id).await.turns;
        let user_turn = Turn::user(message);
        history.push(user_turn.clone());

        if self.settings.commit_policy == CommitPolicy::RecordUserTurn {
            self.store.append(conversation_id, user_turn.clone()).await;
            self.store.truncate(conversation_id, max_turns).await;
        }

        let completion = CompletionRequest {
            messages: prompt::assemble(&self.system_prompt, &history),
        };

        let reply = match client.complete(&completion).await {
            Ok(resp) => resp.response,
            Err(e) => {
                error!("Chat error for conversation '{}': {}", conversation_id, e);
                return Err(ChatError::from(e));
            }
        };

        if self.settings.commit_policy == CommitPolicy::OnSuccess {
            self.store.append(conversation_id, user_turn).await;
        }
        self.store.append(conversation_id, Turn::assistant(reply.clone())).await;
        self.store.truncate(conversation_id, max_turns).await;

        info!(
            "Answered conversation '{}' ({} chars)",
            conversation_id,
            reply.chars().count()
        );

        Ok(ChatResponse {
            response: reply,
            conversation_id: conversation_id.to_string(),
        })
    }
}
