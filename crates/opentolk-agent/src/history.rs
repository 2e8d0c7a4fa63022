//! Per-plugin conversation history.
//!
//! Conversational plugins keep their message history between invocations.
//! Entries are keyed by plugin id and expire after a period without reads or
//! writes. Each entry sits behind its own async mutex, so appends and reads
//! for one plugin are serialized while different plugins never contend.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::sync::Mutex;

use crate::llm::types::Message;

/// Idle time after which a conversation is forgotten.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(10 * 60);

/// Maximum number of conversations held at once.
pub const DEFAULT_MAX_CONVERSATIONS: u64 = 256;

/// Maximum number of messages kept per conversation; the oldest go first.
pub const DEFAULT_MAX_MESSAGES: usize = 40;

type Conversation = Arc<Mutex<Vec<Message>>>;

/// Bounded, expiring store of conversations keyed by plugin id.
#[derive(Clone)]
pub struct ConversationHistory {
    cache: Cache<String, Conversation>,
    max_messages: usize,
}

impl ConversationHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(
            DEFAULT_IDLE_TTL,
            DEFAULT_MAX_CONVERSATIONS,
            DEFAULT_MAX_MESSAGES,
        )
    }

    #[must_use]
    pub fn with_limits(idle_ttl: Duration, max_conversations: u64, max_messages: usize) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_conversations)
            .time_to_idle(idle_ttl)
            .build();
        Self {
            cache,
            max_messages: max_messages.max(1),
        }
    }

    async fn conversation(&self, plugin_id: &str) -> Conversation {
        self.cache
            .get_with(plugin_id.to_string(), async {
                Arc::new(Mutex::new(Vec::new()))
            })
            .await
    }

    /// Append a message, dropping the oldest ones beyond the limit.
    pub async fn append(&self, plugin_id: &str, message: Message) {
        let conversation = self.conversation(plugin_id).await;
        let mut messages = conversation.lock().await;
        messages.push(message);
        let excess = messages.len().saturating_sub(self.max_messages);
        if excess > 0 {
            messages.drain(..excess);
        }
        tracing::trace!(plugin_id, len = messages.len(), "history appended");
    }

    /// Snapshot of the conversation, oldest first. Empty if none exists.
    pub async fn read(&self, plugin_id: &str) -> Vec<Message> {
        match self.cache.get(plugin_id).await {
            Some(conversation) => conversation.lock().await.clone(),
            None => Vec::new(),
        }
    }

    pub async fn clear(&self, plugin_id: &str) {
        self.cache.invalidate(plugin_id).await;
        tracing::debug!(plugin_id, "history cleared");
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConversationHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationHistory")
            .field("conversations", &self.cache.entry_count())
            .field("max_messages", &self.max_messages)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Role;

    #[tokio::test]
    async fn append_then_read_in_order() {
        let history = ConversationHistory::new();
        history.append("com.x.chat", Message::user("hi")).await;
        history.append("com.x.chat", Message::assistant("hello")).await;

        let messages = history.read("com.x.chat").await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "hello");
        assert!(history.read("com.x.other").await.is_empty());
    }

    #[tokio::test]
    async fn oldest_messages_are_dropped() {
        let history = ConversationHistory::with_limits(DEFAULT_IDLE_TTL, 8, 3);
        for i in 0..5 {
            history.append("com.x.chat", Message::user(format!("m{i}"))).await;
        }
        let contents: Vec<_> = history
            .read("com.x.chat")
            .await
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn clear_forgets_conversation() {
        let history = ConversationHistory::new();
        history.append("com.x.chat", Message::user("hi")).await;
        history.clear("com.x.chat").await;
        assert!(history.read("com.x.chat").await.is_empty());
    }

    #[tokio::test]
    async fn idle_conversations_expire() {
        let history = ConversationHistory::with_limits(Duration::from_millis(50), 8, 10);
        history.append("com.x.chat", Message::user("hi")).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(history.read("com.x.chat").await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_are_not_lost() {
        let history = ConversationHistory::with_limits(DEFAULT_IDLE_TTL, 8, 100);
        let mut handles = Vec::new();
        for i in 0..20 {
            let h = history.clone();
            handles.push(tokio::spawn(async move {
                h.append("com.x.chat", Message::user(format!("m{i}"))).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(history.read("com.x.chat").await.len(), 20);
    }
}
