mod memory;

pub use memory::InMemoryHistoryStore;

use async_trait::async_trait;
use log::{ debug, info };
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use crate::cli::Args;
use crate::models::chat::{ Conversation, Turn };

pub const DEFAULT_MAX_TURNS: usize = 20;

/// Per-process conversation memory. Every operation is total: reading or
/// writing an unknown id creates an empty history for it.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Snapshot of the history for `conversation_id`, created empty if absent.
    async fn get(&self, conversation_id: &str) -> Conversation;

    async fn append(&self, conversation_id: &str, turn: Turn);

    /// Drops the oldest turns until at most `max_len` remain.
    async fn truncate(&self, conversation_id: &str, max_len: usize);

    /// Serializes exchanges on one conversation. Held for the duration of a
    /// request; other ids are unaffected.
    async fn lock(&self, conversation_id: &str) -> OwnedMutexGuard<()>;

    /// Removes conversations idle past the retention window. Returns how many
    /// were dropped.
    async fn evict_expired(&self) -> usize;

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Zero means no cap on the number of conversation ids.
    pub max_conversations: usize,
    /// `None` keeps idle conversations until they are pushed out by the cap.
    pub ttl: Option<Duration>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_conversations: 1000,
            ttl: Some(Duration::from_secs(3600)),
        }
    }
}

impl HistoryConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            max_conversations: args.max_conversations,
            ttl: match args.conversation_ttl_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

pub fn initialize_history_store(args: &Args) -> Arc<dyn HistoryStore> {
    let config = HistoryConfig::from_args(args);
    info!(
        "Chat history kept in memory: max_turns={}, max_conversations={}, ttl={:?}",
        args.history_max_turns,
        config.max_conversations,
        config.ttl
    );
    Arc::new(InMemoryHistoryStore::new(config))
}

/// Periodically drops expired conversations until the returned handle is aborted.
pub fn spawn_sweeper(store: Arc<dyn HistoryStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = store.evict_expired().await;
            if removed > 0 {
                info!("Evicted {} idle conversation(s)", removed);
            } else {
                debug!("History sweep found nothing to evict");
            }
        }
    })
}
