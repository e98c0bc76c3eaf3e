pub mod chat;
pub mod cli;
pub mod config;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;

use chat::{ ChatService, ChatSettings };
use cli::Args;
use config::prompt::resolve_system_prompt;
use history::{ initialize_history_store, spawn_sweeper };
use llm::LlmConfig;
use llm::chat::new_client as new_chat_client;
use log::{ info, warn };
use server::Server;
use server::api::AppState;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat Base URL: {}", args.chat_base_url);
    info!("Chat Model: {}", args.chat_model);
    info!("Max Tokens: {}", args.max_tokens);
    info!("Temperature: {}", args.temperature);
    info!("Prompt Path: {}", args.prompt_path.as_deref().unwrap_or("built-in"));
    info!("History Max Turns: {}", args.history_max_turns);
    info!("History Max Conversations: {}", args.max_conversations);
    info!("History TTL (secs): {}", args.conversation_ttl_secs);
    info!("History Commit Policy: {:?}", args.commit_policy);
    info!("Rate Limit (req/s): {}", args.rate_limit_per_second);
    info!("Public Dir: {}", args.public_dir);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let system_prompt = resolve_system_prompt(args.prompt_path.as_deref())?;
    let chat_client = new_chat_client(&LlmConfig::from_args(&args))?;
    if chat_client.is_none() {
        warn!("OPENAI_API_KEY is not set. Chat requests will fail until it is configured.");
    }

    let store = initialize_history_store(&args);
    let sweeper = if args.conversation_ttl_secs > 0 && args.sweep_interval_secs > 0 {
        Some(spawn_sweeper(Arc::clone(&store), Duration::from_secs(args.sweep_interval_secs)))
    } else {
        None
    };

    let chat = ChatService::new(store, chat_client, system_prompt, ChatSettings::from_args(&args));
    let state = AppState::new(chat, args.rate_limit_per_second);

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let result = Server::new(addr, state, args).run().await;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    result
}
