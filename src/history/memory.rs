use async_trait::async_trait;
use log::debug;
use std::collections::{ HashMap, VecDeque };
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{ Mutex, OwnedMutexGuard };
use tokio::time::Instant;

use super::{ HistoryConfig, HistoryStore };
use crate::models::chat::{ Conversation, Turn };

struct Entry {
    turns: VecDeque<Turn>,
    last_access: Instant,
    gate: Arc<Mutex<()>>,
}

impl Entry {
    fn new(now: Instant) -> Self {
        Self {
            turns: VecDeque::new(),
            last_access: now,
            gate: Arc::new(Mutex::new(())),
        }
    }

    fn expired(&self, now: Instant, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| now.duration_since(self.last_access) > ttl)
    }

    /// A request holds or waits on the gate; the map's own clone is the only
    /// other reference.
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.gate) > 1
    }

    fn evictable(&self, now: Instant, ttl: Option<Duration>) -> bool {
        !self.in_use() && self.expired(now, ttl)
    }
}

/// In-memory conversation store bounded in both directions: turns per
/// conversation are truncated by the caller, and whole conversations are
/// evicted by LRU cap and idle TTL.
pub struct InMemoryHistoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    config: HistoryConfig,
}

impl InMemoryHistoryStore {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(HistoryConfig { max_conversations: 0, ttl: None })
    }

    /// Returns the live entry for `id`, creating it (and evicting the least
    /// recently used idle id when at capacity) if needed. Refreshes recency.
    /// Entries with a request in flight are never evicted, so the map can
    /// briefly exceed the cap when every entry is busy.
    fn touch<'a>(&self, entries: &'a mut HashMap<String, Entry>, id: &str) -> &'a mut Entry {
        let now = Instant::now();

        let stale = entries.get(id).is_some_and(|entry| entry.evictable(now, self.config.ttl));
        if stale {
            debug!("Conversation '{}' expired, starting fresh", id);
            entries.remove(id);
        }

        if !entries.contains_key(id) {
            let cap = self.config.max_conversations;
            if cap > 0 && entries.len() >= cap {
                let oldest = entries
                    .iter()
                    .filter(|(_, entry)| !entry.in_use())
                    .min_by_key(|(_, entry)| entry.last_access)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest {
                    debug!("Conversation cap {} reached, evicting '{}'", cap, oldest);
                    entries.remove(&oldest);
                }
            }
        }

        let entry = entries.entry(id.to_string()).or_insert_with(|| Entry::new(now));
        entry.last_access = now;
        entry
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get(&self, conversation_id: &str) -> Conversation {
        let mut entries = self.entries.lock().await;
        let entry = self.touch(&mut entries, conversation_id);
        Conversation {
            id: conversation_id.to_string(),
            turns: entry.turns.iter().cloned().collect(),
        }
    }

    async fn append(&self, conversation_id: &str, turn: Turn) {
        let mut entries = self.entries.lock().await;
        self.touch(&mut entries, conversation_id).turns.push_back(turn);
    }

    async fn truncate(&self, conversation_id: &str, max_len: usize) {
        let mut entries = self.entries.lock().await;
        let turns = &mut self.touch(&mut entries, conversation_id).turns;
        if turns.len() > max_len {
            let excess = turns.len() - max_len;
            turns.drain(..excess);
        }
    }

    async fn lock(&self, conversation_id: &str) -> OwnedMutexGuard<()> {
        let gate = {
            let mut entries = self.entries.lock().await;
            Arc::clone(&self.touch(&mut entries, conversation_id).gate)
        };
        gate.lock_owned().await
    }

    async fn evict_expired(&self) -> usize {
        let Some(ttl) = self.config.ttl else {
            return 0;
        };
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.evictable(now, Some(ttl)));
        before - entries.len()
    }

    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
