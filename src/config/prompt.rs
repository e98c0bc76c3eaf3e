use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;
use thiserror::Error;

use crate::models::chat::Turn;

const DEFAULT_SYSTEM_PROMPT: &str = include_str!("../../prompts/system_prompt.txt");

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Failed to read prompt file '{path}': {source}")] Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Prompt file '{0}' is empty")] Empty(String),
}

/// The persona text prepended to every completion request. Fixed for the
/// lifetime of the process and never stored in a conversation history.
#[derive(Debug, Clone)]
pub struct SystemPrompt(Arc<str>);

impl SystemPrompt {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT.trim_end())
    }
}

pub fn load_system_prompt<P: AsRef<Path>>(path: P) -> Result<SystemPrompt, PromptError> {
    let path_ref = path.as_ref();
    let text = fs::read_to_string(path_ref).map_err(|source| PromptError::Io {
        path: path_ref.display().to_string(),
        source,
    })?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PromptError::Empty(path_ref.display().to_string()));
    }
    info!("Loaded system prompt from '{}' ({} chars)", path_ref.display(), trimmed.len());
    Ok(SystemPrompt::new(trimmed))
}

/// Built-in persona unless a prompt file is given.
pub fn resolve_system_prompt(path: Option<&str>) -> Result<SystemPrompt, PromptError> {
    match path {
        Some(p) if !p.trim().is_empty() => load_system_prompt(p),
        _ => {
            info!("Using built-in system prompt");
            Ok(SystemPrompt::default())
        }
    }
}

/// `[system] + history`, in insertion order.
pub fn assemble(system_prompt: &SystemPrompt, history: &[Turn]) -> Vec<Turn> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Turn::system(system_prompt.as_str()));
    messages.extend(history.iter().cloned());
    messages
}
