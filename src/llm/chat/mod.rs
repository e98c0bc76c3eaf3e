pub mod openai;

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use log::info;

use super::LlmConfig;
use self::openai::OpenAIChatClient;
use crate::models::chat::Turn;

pub const CODE_INSUFFICIENT_QUOTA: &str = "insufficient_quota";
pub const CODE_INVALID_API_KEY: &str = "invalid_api_key";

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Turn>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("completion API returned {status}: {message}")] Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("completion request failed: {0}")] Transport(#[from] reqwest::Error),
    #[error("could not decode completion response: {0}")] Decode(String),
    #[error("completion API returned no message content")]
    EmptyResponse,
    #[error("invalid completion client configuration: {0}")] InvalidConfig(String),
}

impl LlmError {
    /// Provider error code (`error.code` in the OpenAI error envelope), if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            LlmError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

/// Builds the chat client, or `None` when no API key is configured. The server
/// still starts in that case and reports the missing key per request.
pub fn new_client(config: &LlmConfig) -> Result<Option<Arc<dyn ChatClient>>, LlmError> {
    match config.api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => {
            let client = OpenAIChatClient::from_config(config)?;
            info!(
                "Chat client configured: Model={}, BaseURL={}",
                client.get_model(),
                client.get_base_url().unwrap_or_default()
            );
            Ok(Some(Arc::new(client)))
        }
        _ => Ok(None),
    }
}
