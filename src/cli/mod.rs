use clap::Parser;
use crate::chat::CommitPolicy;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// API key for the OpenAI-compatible completion API. Without it the server
    /// still starts, but /chat answers 500.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL for the completion API (e.g., https://api.openai.com)
    #[arg(long, env = "CHAT_BASE_URL", default_value = "https://api.openai.com")]
    pub chat_base_url: String,

    /// Model name for chat completion
    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-3.5-turbo")]
    pub chat_model: String,

    /// Upper bound on tokens generated per reply.
    #[arg(long, env = "CHAT_MAX_TOKENS", default_value = "500")]
    pub max_tokens: u32,

    /// Sampling temperature for chat completion.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub temperature: f32,

    /// Path to a text file replacing the built-in system prompt.
    #[arg(long, env = "PROMPT_PATH")]
    pub prompt_path: Option<String>,

    // --- History Store Args ---
    /// Turns kept per conversation; the oldest are dropped first.
    #[arg(long, env = "HISTORY_MAX_TURNS", default_value = "20")]
    pub history_max_turns: usize,

    /// Maximum number of conversations kept in memory (0 = unlimited). The least
    /// recently used conversation is evicted when full.
    #[arg(long, env = "HISTORY_MAX_CONVERSATIONS", default_value = "1000")]
    pub max_conversations: usize,

    /// Seconds a conversation may sit idle before it is dropped (0 = never).
    #[arg(long, env = "HISTORY_TTL_SECS", default_value = "3600")]
    pub conversation_ttl_secs: u64,

    /// Seconds between sweeps for idle conversations.
    #[arg(long, env = "HISTORY_SWEEP_SECS", default_value = "60")]
    pub sweep_interval_secs: u64,

    /// When the user's turn is written to history.
    #[arg(long, env = "HISTORY_COMMIT_POLICY", value_enum, default_value = "record-user-turn")]
    pub commit_policy: CommitPolicy,

    // --- General App Args ---
    /// Longest accepted chat message in characters (0 = unlimited).
    #[arg(long, env = "MAX_MESSAGE_CHARS", default_value = "0")]
    pub max_message_chars: usize,

    /// Chat requests accepted per second across all clients (0 = unlimited).
    /// When set, excess requests are answered 429.
    #[arg(long, env = "RATE_LIMIT_PER_SECOND", default_value = "0")]
    pub rate_limit_per_second: u32,

    /// Directory with the static portfolio site served at `/`.
    #[arg(long, env = "PUBLIC_DIR", default_value = "public")]
    pub public_dir: String,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:3000")]
    pub server_addr: String,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}
