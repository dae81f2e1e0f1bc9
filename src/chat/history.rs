use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::common::{ChatMessage, MessageType};
use crate::storage::Store;

const EVENT_CAPACITY: usize = 256;

/// The most recent chat messages, oldest first, bounded by `capacity`.
pub struct HistoryWindow {
    pub(super) messages: VecDeque<ChatMessage>,
    capacity: usize,
    store: Arc<dyn Store>,
    events: broadcast::Sender<ChatMessage>,
}

impl HistoryWindow {
    pub fn new(store: Arc<dyn Store>, capacity: usize, seed: Vec<ChatMessage>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut window = Self {
            messages: seed.into(),
            capacity: capacity.max(1),
            store,
            events,
        };
        window.evict();
        window
    }

    /// Seed the window from the newest persisted messages.
    pub async fn load(store: Arc<dyn Store>, capacity: usize) -> Self {
        let seed = match store.last_messages(capacity).await {
            Ok(messages) => messages,
            Err(err) => {
                log::error!("Failed to load chat history: {err}");
                Vec::new()
            }
        };
        for msg in &seed {
            log::trace!("Cached message: {msg:?}");
        }
        let window = Self::new(store, capacity, seed);
        if window.is_empty() {
            log::info!("No cached chat messages; history starts empty");
        } else {
            log::info!("Loaded {} cached chat messages", window.len());
        }
        window
    }

    /// Receive every message added through [`HistoryWindow::append`].
    pub fn subscribe(&self) -> broadcast::Receiver<ChatMessage> {
        self.events.subscribe()
    }

    /// Persist (best-effort), push to the tail and announce a new message.
    pub async fn append(&mut self, msg: ChatMessage) {
        log::debug!("Adding message from {}: {}", msg.username, msg.message);
        self.persist(&msg).await;

        self.messages.push_back(msg.clone());
        self.evict();
        // No subscribers is fine.
        let _ = self.events.send(msg);
    }

    pub(super) async fn persist(&self, msg: &ChatMessage) {
        if let Err(err) = self.store.put_msg(msg).await {
            log::error!("Failed to log message {msg:?}: {err}");
        }
    }

    pub(super) fn evict(&mut self) {
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    /// `say` messages of `username` dated at or after `after`, oldest first.
    ///
    /// Every call scans the current contents again.
    pub fn query<'a>(
        &'a self,
        username: &'a str,
        after: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a ChatMessage> + 'a {
        self.messages.iter().filter(move |msg| {
            msg.kind == MessageType::Say && msg.username == username && msg.date >= after
        })
    }

    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn message(username: &str, kind: MessageType, millis: i64) -> ChatMessage {
        ChatMessage {
            username: username.into(),
            message: format!("{username}@{millis}"),
            kind,
            moderator: false,
            date: Utc.timestamp_millis_opt(millis).unwrap(),
        }
    }

    #[tokio::test]
    async fn append_evicts_oldest_beyond_capacity() {
        let store = Arc::new(MemoryStore::new());
        let mut window = HistoryWindow::new(store.clone(), 3, Vec::new());

        for t in 1..=4 {
            window.append(message("u", MessageType::Say, t * 1_000)).await;
        }

        let times: Vec<i64> = window.messages().map(ChatMessage::millis).collect();
        assert_eq!(times, vec![2_000, 3_000, 4_000]);
        assert_eq!(store.msg_writes(), 4);
    }

    #[tokio::test]
    async fn append_keeps_message_when_persistence_fails() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let mut window = HistoryWindow::new(store.clone(), 10, Vec::new());
        let mut events = window.subscribe();

        let msg = message("u", MessageType::Say, 5_000);
        window.append(msg.clone()).await;

        assert_eq!(window.len(), 1);
        assert!(store.stored_messages().is_empty());
        assert_eq!(events.recv().await.unwrap(), msg);
    }

    #[tokio::test]
    async fn query_filters_type_user_and_date() {
        let seed = vec![
            message("ann", MessageType::Say, 1_000),
            message("bob", MessageType::Say, 2_000),
            message("ann", MessageType::Mute, 3_000),
            message("ann", MessageType::Say, 4_000),
            message("ann", MessageType::Other, 5_000),
            message("ann", MessageType::Say, 6_000),
        ];
        let window = HistoryWindow::new(Arc::new(MemoryStore::new()), 10, seed);
        let after = Utc.timestamp_millis_opt(4_000).unwrap();

        let first: Vec<i64> = window.query("ann", after).map(ChatMessage::millis).collect();
        assert_eq!(first, vec![4_000, 6_000]);

        // restartable
        assert_eq!(window.query("ann", after).count(), 2);
        assert_eq!(window.query("carl", after).count(), 0);
    }

    #[tokio::test]
    async fn load_seeds_from_newest_messages() {
        let stored: Vec<ChatMessage> = (1..=5)
            .map(|t| message("u", MessageType::Say, t * 1_000))
            .collect();
        let store = Arc::new(MemoryStore::with_messages(stored));

        let window = HistoryWindow::load(store, 2).await;
        let times: Vec<i64> = window.messages().map(ChatMessage::millis).collect();
        assert_eq!(times, vec![4_000, 5_000]);
    }

    #[tokio::test]
    async fn load_from_empty_store_starts_empty() {
        let window = HistoryWindow::load(Arc::new(MemoryStore::new()), 5).await;
        assert!(window.is_empty());
        assert_eq!(window.capacity(), 5);
    }
}
