use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Entries kept per conversation. The oldest entry is evicted first.
pub const MAX_HISTORY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub sender: Sender,
    pub message: String,
}

/// Conversation history, scoped to the application lifetime.
pub trait SessionStore: Send + Sync {
    fn append(&self, key: &str, sender: Sender, message: &str);
    fn history(&self, key: &str) -> Vec<HistoryEntry>;
    fn clear(&self, key: &str);
}

/// Process-memory store. Everything is lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    conversations: Mutex<HashMap<String, VecDeque<HistoryEntry>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn append(&self, key: &str, sender: Sender, message: &str) {
        let Ok(mut conversations) = self.conversations.lock() else {
            warn!("Session store lock poisoned, dropping message for {}", key);
            return;
        };
        let conversation = conversations.entry(key.to_string()).or_default();
        conversation.push_back(HistoryEntry {
            sender,
            message: message.to_string(),
        });
        while conversation.len() > MAX_HISTORY {
            conversation.pop_front();
        }
    }

    fn history(&self, key: &str) -> Vec<HistoryEntry> {
        self.conversations
            .lock()
            .map(|c| c.get(key).map(|h| h.iter().cloned().collect()).unwrap_or_default())
            .unwrap_or_default()
    }

    fn clear(&self, key: &str) {
        if let Ok(mut conversations) = self.conversations.lock() {
            conversations.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eleventh_entry_evicts_the_oldest() {
        let store = MemorySessionStore::new();
        for i in 0..11 {
            store.append("usuario", Sender::User, &format!("msg {i}"));
        }

        let history = store.history("usuario");
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history[0].message, "msg 1");
        assert_eq!(history[9].message, "msg 10");
    }

    #[test]
    fn keys_are_independent() {
        let store = MemorySessionStore::new();
        for i in 0..25 {
            store.append("usuario", Sender::User, &format!("u{i}"));
        }
        store.append("agente", Sender::Bot, "hola");

        assert_eq!(store.history("usuario").len(), MAX_HISTORY);
        assert_eq!(store.history("agente").len(), 1);

        store.clear("usuario");
        assert!(store.history("usuario").is_empty());
        assert_eq!(store.history("agente").len(), 1);
    }
}
